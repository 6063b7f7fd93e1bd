use tandem_schema::Card;

/// Parse Limitless-style deck text into structured cards.
///
/// Each line is `QUANTITY NAME SET NUMBER`, e.g. `2 Pikachu ex A1 96`.
/// Blank lines and `#` comments are skipped, a stray `:` is dropped, and
/// lines that do not fit the shape are ignored rather than failing the
/// whole paste.
pub fn parse_decklist(text: &str) -> Vec<Card> {
    text.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<Card> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let cleaned = trimmed.replacen(':', "", 1);

    let tokens: Vec<&str> = cleaned.split_whitespace().collect();
    if tokens.len() < 4 {
        return None;
    }

    let quantity: u32 = tokens.first()?.parse().ok()?;
    let number = *tokens.last()?;
    if !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let set = tokens[tokens.len() - 2];
    if !set.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
        return None;
    }
    let name = tokens[1..tokens.len() - 2].join(" ");
    if name.is_empty() || quantity == 0 {
        return None;
    }

    Some(Card::with_quantity(&name, set, number, quantity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_basic_lines() {
        let cards = parse_decklist("4 Pikachu A1 1\n16 Bulbasaur A1 2");
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0], Card::with_quantity("Pikachu", "A1", "1", 4));
        assert_eq!(cards[1].quantity, 16);
    }

    #[test]
    fn test_multiword_names_keep_their_spaces() {
        let cards = parse_decklist("2 Pikachu ex A1 96");
        assert_eq!(cards[0].name, "Pikachu ex");
        assert_eq!(cards[0].set, "A1");
        assert_eq!(cards[0].number, "96");
    }

    #[test]
    fn test_comments_blanks_and_garbage_are_skipped() {
        let text = "# my deck\n\n4 Pikachu A1 1\nnot a card line\n0 Meowth A1 3\nPokemon: 20";
        let cards = parse_decklist(text);
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].name, "Pikachu");
    }

    #[test]
    fn test_colon_is_stripped_before_parsing() {
        let cards = parse_decklist("2 Type: Null A2 118");
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].name, "Type Null");
    }

    #[test]
    fn test_accented_names_parse() {
        let cards = parse_decklist("1 Flabébé A3 11");
        assert_eq!(cards[0].name, "Flabébé");
    }

    #[test]
    fn test_non_numeric_card_number_is_rejected() {
        assert!(parse_decklist("2 Pikachu A1 1a").is_empty());
    }
}
