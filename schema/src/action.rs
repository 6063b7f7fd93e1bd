use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{MatchId, PlayerId};
use crate::timestamp::Timestamp;

/// Closed enumeration of everything a client can broadcast.
///
/// Tags serialize as the store's snake_case strings. Payload shape is
/// free-form per kind; the sync engine only guarantees delivery and
/// ordering, not payload semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Attack,
    AttachEnergy,
    PlayTrainer,
    PlayPokemon,
    UseAbility,
    Evolve,
    Retreat,
    Promote,
    DrawCards,
    EndTurn,
    StartTurn,
    KnockOut,
    StatusEffect,
    Heal,
    Damage,
    ShuffleDeck,
    SearchDeck,
    Discard,
    ForceSwitchSelection,
    ForceSwitchSelected,
    ResetRequest,
    ResetAccepted,
    ResetDeclined,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Attack => "attack",
            ActionKind::AttachEnergy => "attach_energy",
            ActionKind::PlayTrainer => "play_trainer",
            ActionKind::PlayPokemon => "play_pokemon",
            ActionKind::UseAbility => "use_ability",
            ActionKind::Evolve => "evolve",
            ActionKind::Retreat => "retreat",
            ActionKind::Promote => "promote",
            ActionKind::DrawCards => "draw_cards",
            ActionKind::EndTurn => "end_turn",
            ActionKind::StartTurn => "start_turn",
            ActionKind::KnockOut => "knock_out",
            ActionKind::StatusEffect => "status_effect",
            ActionKind::Heal => "heal",
            ActionKind::Damage => "damage",
            ActionKind::ShuffleDeck => "shuffle_deck",
            ActionKind::SearchDeck => "search_deck",
            ActionKind::Discard => "discard",
            ActionKind::ForceSwitchSelection => "force_switch_selection",
            ActionKind::ForceSwitchSelected => "force_switch_selected",
            ActionKind::ResetRequest => "reset_request",
            ActionKind::ResetAccepted => "reset_accepted",
            ActionKind::ResetDeclined => "reset_declined",
        }
    }
}

/// One record of the per-match append-only action log.
///
/// Created by the acting client and never mutated by its author; the
/// cloud validation collaborator flips the three validation flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub match_id: MatchId,
    pub player_id: PlayerId,
    #[serde(rename = "actionType")]
    pub kind: ActionKind,
    #[serde(rename = "actionData", default)]
    pub payload: Value,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub validated: bool,
    #[serde(default)]
    pub rejected: bool,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

impl Action {
    pub fn new(match_id: MatchId, player_id: PlayerId, kind: ActionKind, payload: Value) -> Self {
        Self {
            match_id,
            player_id,
            kind,
            payload,
            timestamp: Timestamp::server(),
            validated: false,
            rejected: false,
            rejection_reason: None,
        }
    }

    /// The optimistic-execution id the author tagged into the payload,
    /// if this action went through the validator.
    pub fn action_id(&self) -> Option<&str> {
        self.payload.get("actionId")?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_match_wire_strings() {
        let json = serde_json::to_value(ActionKind::AttachEnergy).unwrap();
        assert_eq!(json, serde_json::json!("attach_energy"));
        let kind: ActionKind = serde_json::from_value(serde_json::json!("force_switch_selected")).unwrap();
        assert_eq!(kind, ActionKind::ForceSwitchSelected);
        assert_eq!(ActionKind::KnockOut.as_str(), "knock_out");
    }

    #[test]
    fn test_action_wire_shape() {
        let action = Action::new(
            MatchId::from("m1"),
            PlayerId::from("alice"),
            ActionKind::Attack,
            serde_json::json!({ "attackName": "Thunderbolt" }),
        );
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["matchId"], "m1");
        assert_eq!(json["actionType"], "attack");
        assert_eq!(json["actionData"]["attackName"], "Thunderbolt");
        assert_eq!(json["timestamp"], serde_json::json!({ ".sv": "timestamp" }));
        assert_eq!(json["validated"], false);
    }

    #[test]
    fn test_action_id_extraction() {
        let mut action = Action::new(
            MatchId::from("m1"),
            PlayerId::from("alice"),
            ActionKind::Heal,
            serde_json::json!({ "actionId": "a-42", "amount": 30 }),
        );
        assert_eq!(action.action_id(), Some("a-42"));
        action.payload = serde_json::json!({});
        assert_eq!(action.action_id(), None);
    }
}
