use tandem_schema::{Action, PlayerId};
use tokio::sync::mpsc;

/// Everything a live session multiplexes onto its event channel: remote
/// state changes, opponent actions, presence flips, and connectivity.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The mirrored game state changed; read details off the mirror.
    StateChanged,
    /// The opponent appended an action to the match log.
    OpponentAction(Action),
    /// The opponent's presence record flipped.
    Presence { player: PlayerId, online: bool },
    /// Transport connectivity changed.
    Connectivity(bool),
    /// Every reconnection attempt failed; only a manual restart helps.
    ReconnectExhausted,
}

/// User-facing notices. Components never render anything themselves;
/// they push one of these and the embedding UI decides how to show it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    ActionRejected { reason: String },
    /// A broadcast failed at the transport and its local effect was
    /// rolled back.
    ActionNotSaved,
    NotYourTurn,
    Reconnected,
    /// Reconnection attempts are exhausted; refresh required.
    ConnectionLost,
    OpponentOnline,
    OpponentOffline,
    SignInRequired,
    ReturnToLobby,
    Generic(String),
}

/// Cloneable producer half of the notice channel, handed to every
/// component at construction.
#[derive(Clone)]
pub struct NoticeSink {
    tx: mpsc::UnboundedSender<Notice>,
}

impl NoticeSink {
    pub fn channel() -> (NoticeSink, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (NoticeSink { tx }, rx)
    }

    pub fn push(&self, notice: Notice) {
        if self.tx.send(notice.clone()).is_err() {
            // Headless embedder dropped the receiver; the notice still
            // reaches the log.
            tracing::info!(?notice, "notice with no consumer");
        }
    }
}
