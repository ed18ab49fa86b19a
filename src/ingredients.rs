//! Turns a free-text dish description into a normalized ingredient map.
//!
//! The model is asked to answer with a dictionary literal somewhere in its
//! reply. Replies are messy, so the literal is located by brace position and
//! read with a small tokenizer that accepts quoted strings and numbers only.
//! Nothing in the reply is ever evaluated.

use crate::{chat::{ChatClient, GenerationError}, models::IngredientMap};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("ingredient request failed: {0}")] Generation(#[from] GenerationError),
    #[error("no dictionary found in the model reply")] PatternMiss,
    #[error("malformed dictionary: {0}")] Parse(String),
}

pub fn build_extraction_prompt(description: &str) -> String {
    format!(
        "From the following dish description: '{description}', \
        extract a list of real-life ingredients along with their quantities. \
        If any ingredient is fictional or not readily available, replace it with a real-life equivalent that closely matches its characteristics or purpose. \
        Use general terms as fallbacks for specific ingredients, ensuring they are realistic and usable in cooking. \
        Return the final ingredients as a Python dictionary where the key is the ingredient name and the value is the quantity. \
        Ensure the output is formatted as a dictionary with proper key-value pairs."
    )
}

/// Asks the model for the ingredient dictionary and returns it normalized.
pub async fn extract(chat: &ChatClient, description: &str) -> Result<IngredientMap, ExtractionError> {
    let reply = chat.complete(&build_extraction_prompt(description)).await?;
    match parse_reply(&reply) {
        Ok(raw) => {
            let cleaned = clean_ingredients(&raw);
            info!("📝 Extracted {} ingredients", cleaned.len());
            Ok(cleaned)
        }
        Err(e) => {
            error!("❌ Could not read ingredients from reply: {}", e);
            Err(e)
        }
    }
}

/// Locates the dictionary literal in a model reply and parses it.
pub fn parse_reply(reply: &str) -> Result<IngredientMap, ExtractionError> {
    let literal = find_mapping_literal(reply).ok_or(ExtractionError::PatternMiss)?;
    parse_mapping_literal(&straighten_quotes(literal))
}

/// From the first `{` to the last `}`, greedy across lines.
pub fn find_mapping_literal(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

pub fn straighten_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            other => other,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Comma,
    Colon,
    Str(String),
    Num(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExtractionError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '{' => tokens.push(Token::Open),
            '}' => tokens.push(Token::Close),
            ',' => tokens.push(Token::Comma),
            ':' => tokens.push(Token::Colon),
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some((_, 'n')) => value.push('\n'),
                            Some((_, 't')) => value.push('\t'),
                            Some((_, escaped)) => value.push(escaped),
                            None => break,
                        },
                        c if c == quote => {
                            closed = true;
                            break;
                        }
                        c => value.push(c),
                    }
                }
                if !closed {
                    return Err(ExtractionError::Parse(format!("unterminated string starting at offset {pos}")));
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() || c == '-' || c == '.' => {
                let mut number = String::from(c);
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_ascii_digit() || next == '.' {
                        number.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if number.parse::<f64>().is_err() {
                    return Err(ExtractionError::Parse(format!("invalid number '{number}' at offset {pos}")));
                }
                tokens.push(Token::Num(number));
            }
            other => {
                return Err(ExtractionError::Parse(format!("unexpected character '{other}' at offset {pos}")));
            }
        }
    }
    Ok(tokens)
}

/// Parses a flat `{key: value, ...}` literal. Keys and values may be quoted
/// strings or numbers; a trailing comma is accepted and a repeated key keeps
/// its last value.
pub fn parse_mapping_literal(input: &str) -> Result<IngredientMap, ExtractionError> {
    let tokens = tokenize(input)?;
    let mut iter = tokens.into_iter();
    let mut map = IngredientMap::new();

    if iter.next() != Some(Token::Open) {
        return Err(ExtractionError::Parse("expected '{'".into()));
    }

    loop {
        let key = match iter.next() {
            Some(Token::Close) => break,
            Some(Token::Str(s)) | Some(Token::Num(s)) => s,
            other => return Err(ExtractionError::Parse(format!("expected key, found {other:?}"))),
        };
        if iter.next() != Some(Token::Colon) {
            return Err(ExtractionError::Parse(format!("expected ':' after key '{key}'")));
        }
        let value = match iter.next() {
            Some(Token::Str(s)) | Some(Token::Num(s)) => s,
            other => return Err(ExtractionError::Parse(format!("expected value for '{key}', found {other:?}"))),
        };
        map.insert(key, value);
        match iter.next() {
            Some(Token::Comma) => continue,
            Some(Token::Close) => break,
            other => return Err(ExtractionError::Parse(format!("expected ',' or '}}', found {other:?}"))),
        }
    }

    if let Some(extra) = iter.next() {
        return Err(ExtractionError::Parse(format!("trailing content after dictionary: {extra:?}")));
    }
    Ok(map)
}

/// Drops parenthetical notes from names, collapses whitespace and trims
/// quantities. Names that collapse together keep the later quantity.
pub fn clean_ingredients(raw: &IngredientMap) -> IngredientMap {
    raw.iter()
        .map(|(name, quantity)| {
            let base = name.split('(').next().unwrap_or_default();
            let name = base.split_whitespace().collect::<Vec<_>>().join(" ");
            (name, quantity.trim().to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::tests::{completion, test_settings};
    use pretty_assertions::assert_eq;
    use wiremock::{matchers::method, Mock, MockServer};

    fn pairs(map: &IngredientMap) -> Vec<(&str, &str)> {
        map.iter().collect()
    }

    #[test]
    fn reads_literal_embedded_in_prose() {
        let reply = "Sure! Here you go:\n{'Soul Flour': '200g',\n 'Zanpakuto Syrup': '50ml'}\nEnjoy.";
        let map = parse_reply(reply).unwrap();
        assert_eq!(pairs(&map), vec![("Soul Flour", "200g"), ("Zanpakuto Syrup", "50ml")]);
    }

    #[test]
    fn typographic_quotes_are_straightened() {
        let reply = "{\u{2018}rice\u{2019}: \u{2018}300g\u{2019}, \u{201C}nori\u{201D}: \u{201C}2 sheets\u{201D}}";
        let map = parse_reply(reply).unwrap();
        assert_eq!(pairs(&map), vec![("rice", "300g"), ("nori", "2 sheets")]);
    }

    #[test]
    fn no_braces_is_a_pattern_miss() {
        let err = parse_reply("I could not think of any ingredients.").unwrap_err();
        assert!(matches!(err, ExtractionError::PatternMiss));
        assert!(matches!(parse_reply("} backwards {"), Err(ExtractionError::PatternMiss)));
    }

    #[test]
    fn non_literal_content_is_a_parse_error() {
        for reply in [
            "{'flour': __import__('os')}",
            "{'flour' '200g'}",
            "{'flour': '200g' 'sugar': '1g'}",
            "{'flour': {'nested': '1'}}",
            "{'flour': '200g}",
        ] {
            assert!(matches!(parse_reply(reply), Err(ExtractionError::Parse(_))), "accepted {reply}");
        }
    }

    #[test]
    fn numbers_trailing_commas_and_escapes_are_accepted() {
        let map = parse_mapping_literal(r#"{"eggs": 2, 'chef\'s salt': "1.5g",}"#).unwrap();
        assert_eq!(pairs(&map), vec![("eggs", "2"), ("chef's salt", "1.5g")]);
        assert!(parse_mapping_literal("{}").unwrap().is_empty());
    }

    #[test]
    fn greedy_match_spans_to_last_brace() {
        assert_eq!(find_mapping_literal("a {x} b {y} c"), Some("{x} b {y}"));
    }

    #[test]
    fn cleaning_strips_notes_and_whitespace() {
        let raw: IngredientMap = [
            ("Soul  Flour (all-purpose)", " 200g "),
            ("  green\ttea   powder ", "5g"),
        ]
        .into_iter()
        .collect();
        let cleaned = clean_ingredients(&raw);
        assert_eq!(pairs(&cleaned), vec![("Soul Flour", "200g"), ("green tea powder", "5g")]);
    }

    #[test]
    fn cleaning_is_idempotent() {
        let raw: IngredientMap = [("Butter (unsalted)", " 50g"), ("sugar  ", "100 g "), ("Milk", "1/2")]
            .into_iter()
            .collect();
        let once = clean_ingredients(&raw);
        assert_eq!(clean_ingredients(&once), once);
    }

    #[test]
    fn collapsed_names_keep_the_later_quantity() {
        let raw: IngredientMap = [("Rice (short grain)", "200g"), ("Rice (sushi)", "300g")].into_iter().collect();
        let cleaned = clean_ingredients(&raw);
        assert_eq!(pairs(&cleaned), vec![("Rice", "300g")]);
    }

    #[tokio::test]
    async fn extract_asks_the_model_and_normalizes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion("Ingredients: {'Hollow Cream (whipped)': ' 80g '}"))
            .expect(1)
            .mount(&server)
            .await;

        let chat = ChatClient::new(&test_settings(&server));
        let map = extract(&chat, "A cake").await.unwrap();
        assert_eq!(pairs(&map), vec![("Hollow Cream", "80g")]);
    }

    #[tokio::test]
    async fn extract_reports_pattern_miss_from_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion("flour and sugar"))
            .mount(&server)
            .await;

        let chat = ChatClient::new(&test_settings(&server));
        assert!(matches!(extract(&chat, "A cake").await, Err(ExtractionError::PatternMiss)));
    }
}
