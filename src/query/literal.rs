//! Structured-literal parser for generator output.
//!
//! Accepts JSON plus the relaxed forms models tend to emit when asked for a
//! pipeline: single-quoted strings, `True`/`False`/`None`, bare object keys,
//! trailing commas, parenthesised tuples, and a few constructors:
//!
//! - `datetime.datetime(y, m, d[, h, mi, s, us])` and `datetime(...)`
//! - `ISODate("...")`, `new Date("...")`, `Date("...")` (string or epoch millis)
//! - `ObjectId("...")`
//!
//! Dates become `{"$date": "<RFC 3339>"}` and object ids `{"$oid": "<hex>"}`,
//! which the database layer turns back into native BSON. Nothing is ever
//! evaluated.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value, json};
use thiserror::Error;

/// Parse failure with the character offset where it happened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiteralError {
    /// Input ended inside a value.
    #[error("unexpected end of input")]
    UnexpectedEnd,
    /// A character that cannot start or continue the current value.
    #[error("unexpected character {found:?} at offset {offset}")]
    Unexpected {
        /// Offending character.
        found: char,
        /// Character offset.
        offset: usize,
    },
    /// Malformed numeric literal.
    #[error("invalid number at offset {offset}")]
    InvalidNumber {
        /// Character offset.
        offset: usize,
    },
    /// Bare word that is neither a keyword nor a known constructor.
    #[error("unknown identifier {name:?} at offset {offset}")]
    UnknownIdentifier {
        /// The identifier.
        name: String,
        /// Character offset.
        offset: usize,
    },
    /// Constructor arguments that do not form a valid value.
    #[error("invalid {constructor} arguments at offset {offset}: {reason}")]
    InvalidConstructor {
        /// Constructor name.
        constructor: String,
        /// Character offset.
        offset: usize,
        /// What was wrong.
        reason: String,
    },
    /// Text left over after a complete value.
    #[error("trailing input at offset {offset}")]
    TrailingInput {
        /// Character offset.
        offset: usize,
    },
}

/// Parse one complete literal from `input`.
///
/// # Errors
/// Returns a [`LiteralError`] when the text is not a single well-formed
/// literal.
pub fn parse_literal(input: &str) -> Result<Value, LiteralError> {
    let mut parser = Parser::new(input);
    parser.skip_ws();
    let value = parser.value()?;
    parser.skip_ws();
    match parser.peek() {
        None => Ok(value),
        Some(_) => Err(LiteralError::TrailingInput { offset: parser.pos }),
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, wanted: char) -> Result<(), LiteralError> {
        match self.bump() {
            Some(c) if c == wanted => Ok(()),
            Some(found) => Err(LiteralError::Unexpected {
                found,
                offset: self.pos - 1,
            }),
            None => Err(LiteralError::UnexpectedEnd),
        }
    }

    fn unexpected_here(&self) -> LiteralError {
        self.peek().map_or(LiteralError::UnexpectedEnd, |found| {
            LiteralError::Unexpected {
                found,
                offset: self.pos,
            }
        })
    }

    fn value(&mut self) -> Result<Value, LiteralError> {
        match self.peek() {
            None => Err(LiteralError::UnexpectedEnd),
            Some('{') => self.object(),
            Some('[') => self.sequence('[', ']').map(Value::Array),
            Some('(') => self.sequence('(', ')').map(Value::Array),
            Some('"' | '\'') => self.string().map(Value::String),
            Some(c) if c == '-' || c == '+' || c.is_ascii_digit() => self.number(),
            Some(c) if is_ident_start(c) => self.word(),
            Some(_) => Err(self.unexpected_here()),
        }
    }

    fn object(&mut self) -> Result<Value, LiteralError> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(Value::Object(map));
            }

            let key = self.key()?;
            self.skip_ws();
            self.expect(':')?;
            self.skip_ws();
            let value = self.value()?;
            map.insert(key, value);

            self.skip_ws();
            match self.bump() {
                Some(',') => {}
                Some('}') => return Ok(Value::Object(map)),
                Some(found) => {
                    return Err(LiteralError::Unexpected {
                        found,
                        offset: self.pos - 1,
                    });
                }
                None => return Err(LiteralError::UnexpectedEnd),
            }
        }
    }

    fn key(&mut self) -> Result<String, LiteralError> {
        match self.peek() {
            Some('"' | '\'') => self.string(),
            Some(c) if is_ident_start(c) || c.is_ascii_digit() => {
                let start = self.pos;
                while self.peek().is_some_and(is_ident_continue) {
                    self.pos += 1;
                }
                Ok(self.chars[start..self.pos].iter().collect())
            }
            _ => Err(self.unexpected_here()),
        }
    }

    fn sequence(&mut self, open: char, close: char) -> Result<Vec<Value>, LiteralError> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(items);
            }

            items.push(self.value()?);

            self.skip_ws();
            match self.bump() {
                Some(',') => {}
                Some(c) if c == close => return Ok(items),
                Some(found) => {
                    return Err(LiteralError::Unexpected {
                        found,
                        offset: self.pos - 1,
                    });
                }
                None => return Err(LiteralError::UnexpectedEnd),
            }
        }
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let quote = self.bump().ok_or(LiteralError::UnexpectedEnd)?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(LiteralError::UnexpectedEnd),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => out.push(self.escape()?),
                Some(c) => out.push(c),
            }
        }
    }

    fn escape(&mut self) -> Result<char, LiteralError> {
        let offset = self.pos;
        match self.bump() {
            None => Err(LiteralError::UnexpectedEnd),
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('b') => Ok('\u{8}'),
            Some('f') => Ok('\u{c}'),
            Some('0') => Ok('\0'),
            Some('u') => {
                let hex: String = (0..4).filter_map(|_| self.bump()).collect();
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or(LiteralError::Unexpected { found: 'u', offset })
            }
            Some(other) => Ok(other),
        }
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' | 'e' | 'E' => is_float = true,
                '-' | '+' if matches!(self.chars.get(self.pos - 1), Some('e' | 'E')) => {}
                _ => break,
            }
            self.pos += 1;
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        let text = text.trim_start_matches('+');
        let invalid = LiteralError::InvalidNumber { offset: start };

        if !is_float {
            if let Ok(i) = text.parse::<i64>() {
                return Ok(Value::from(i));
            }
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or(invalid)
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn word(&mut self) -> Result<Value, LiteralError> {
        let offset = self.pos;
        let mut name = self.identifier();

        match name.as_str() {
            "true" | "True" => return Ok(Value::Bool(true)),
            "false" | "False" => return Ok(Value::Bool(false)),
            "null" | "None" => return Ok(Value::Null),
            "new" => {
                self.skip_ws();
                name = self.identifier();
            }
            _ => {}
        }

        self.skip_ws();
        if self.peek() != Some('(') {
            return Err(LiteralError::UnknownIdentifier { name, offset });
        }
        let args = self.sequence('(', ')')?;
        constructor(&name, &args, offset)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.')
}

fn constructor(name: &str, args: &[Value], offset: usize) -> Result<Value, LiteralError> {
    let invalid = |reason: &str| LiteralError::InvalidConstructor {
        constructor: name.to_string(),
        offset,
        reason: reason.to_string(),
    };

    match name {
        "datetime.datetime" | "datetime" => {
            let parts = args
                .iter()
                .map(|v| v.as_i64().and_then(|i| u32::try_from(i).ok()))
                .collect::<Option<Vec<u32>>>()
                .ok_or_else(|| invalid("expected non-negative integers"))?;
            if !(3..=7).contains(&parts.len()) {
                return Err(invalid("expected 3 to 7 fields"));
            }
            let field = |i: usize| parts.get(i).copied().unwrap_or(0);
            let year = i32::try_from(field(0)).map_err(|_| invalid("year out of range"))?;
            let dt = NaiveDate::from_ymd_opt(year, field(1), field(2))
                .and_then(|d| d.and_hms_micro_opt(field(3), field(4), field(5), field(6)))
                .ok_or_else(|| invalid("no such date"))?;
            Ok(date_value(dt.and_utc()))
        }
        "ISODate" | "Date" => match args.first() {
            Some(Value::String(s)) => parse_date_string(s)
                .map(date_value)
                .ok_or_else(|| invalid("unrecognised date format")),
            Some(Value::Number(n)) => n
                .as_i64()
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(date_value)
                .ok_or_else(|| invalid("epoch millis out of range")),
            _ => Err(invalid("expected a date string or epoch millis")),
        },
        "ObjectId" => match args.first() {
            Some(Value::String(hex))
                if hex.len() == 24 && hex.chars().all(|c| c.is_ascii_hexdigit()) =>
            {
                Ok(json!({ "$oid": hex }))
            }
            _ => Err(invalid("expected a 24-digit hex string")),
        },
        _ => Err(LiteralError::UnknownIdentifier {
            name: name.to_string(),
            offset,
        }),
    }
}

fn date_value(dt: DateTime<Utc>) -> Value {
    json!({ "$date": dt.to_rfc3339_opts(SecondsFormat::Millis, true) })
}

fn parse_date_string(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json() {
        let value = parse_literal(r#"{"collection": "tickets", "pipeline": [{"$limit": 10}]}"#)
            .unwrap();
        assert_eq!(value, json!({"collection": "tickets", "pipeline": [{"$limit": 10}]}));
    }

    #[test]
    fn test_python_style_literal() {
        let value = parse_literal(
            "{'collection': 'tickets', 'pipeline': [{'$match': {'closed': False, 'owner': None}}, {'$limit': 5,},]}",
        )
        .unwrap();
        assert_eq!(
            value,
            json!({
                "collection": "tickets",
                "pipeline": [{"$match": {"closed": false, "owner": null}}, {"$limit": 5}]
            })
        );
    }

    #[test]
    fn test_bare_keys_and_tuples() {
        let value = parse_literal("{$sort: {created.at: -1}, ids: (1, 2)}").unwrap();
        assert_eq!(value, json!({"$sort": {"created.at": -1}, "ids": [1, 2]}));
    }

    #[test]
    fn test_datetime_constructors() {
        let value = parse_literal("{'$gte': datetime.datetime(2024, 3, 1, 12, 30)}").unwrap();
        assert_eq!(value, json!({"$gte": {"$date": "2024-03-01T12:30:00.000Z"}}));

        let value = parse_literal(r#"new Date("2024-03-01")"#).unwrap();
        assert_eq!(value, json!({"$date": "2024-03-01T00:00:00.000Z"}));

        let value = parse_literal(r#"ISODate("2024-03-01T08:00:00+02:00")"#).unwrap();
        assert_eq!(value, json!({"$date": "2024-03-01T06:00:00.000Z"}));

        let value = parse_literal("Date(0)").unwrap();
        assert_eq!(value, json!({"$date": "1970-01-01T00:00:00.000Z"}));
    }

    #[test]
    fn test_object_id_constructor() {
        let value = parse_literal(r#"ObjectId("65f1c0ffee0000000000beef")"#).unwrap();
        assert_eq!(value, json!({"$oid": "65f1c0ffee0000000000beef"}));
        assert!(parse_literal(r#"ObjectId("xyz")"#).is_err());
    }

    #[test]
    fn test_code_is_not_evaluated() {
        let err = parse_literal("__import__('os').system('ls')").unwrap_err();
        assert!(matches!(err, LiteralError::UnknownIdentifier { .. }));

        let err = parse_literal("datetime.datetime.now()").unwrap_err();
        assert!(matches!(err, LiteralError::InvalidConstructor { .. } | LiteralError::UnknownIdentifier { .. }));
    }

    #[test]
    fn test_errors_carry_offsets() {
        assert_eq!(
            parse_literal("[1, 2] trailing"),
            Err(LiteralError::TrailingInput { offset: 7 })
        );
        assert_eq!(parse_literal("{'a': 1"), Err(LiteralError::UnexpectedEnd));
        assert_eq!(
            parse_literal("{'a' 1}"),
            Err(LiteralError::Unexpected { found: '1', offset: 5 })
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse_literal("-3").unwrap(), json!(-3));
        assert_eq!(parse_literal("2.5e2").unwrap(), json!(250.0));
        assert_eq!(parse_literal("1_000").unwrap(), json!(1000));
    }
}
