//! Tolerant payload parsing.
//!
//! Usage log payloads arrive either as JSON or as the `repr()` of a Python
//! dictionary (single-quoted strings, `True`/`False`/`None`). JSON is tried
//! first; anything else goes through a small literal parser that accepts the
//! Python spelling and produces ordinary JSON values.

use anyhow::{bail, Result};
use serde_json::{Map, Number, Value};

/// Parse a payload that is either JSON or a Python literal.
pub fn parse(input: &str) -> Result<Value> {
    if let Ok(value) = serde_json::from_str(input) {
        return Ok(value);
    }
    let mut parser = Parser {
        input,
        rest: input.char_indices().peekable(),
    };
    let value = parser.value()?;
    parser.skip_whitespace();
    if let Some((at, c)) = parser.rest.peek() {
        bail!("trailing content {c:?} at byte {at}");
    }
    Ok(value)
}

struct Parser<'a> {
    input: &'a str,
    rest: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl Parser<'_> {
    fn value(&mut self) -> Result<Value> {
        self.skip_whitespace();
        match self.rest.peek() {
            Some((_, '{')) => self.dict(),
            Some((_, '[')) => self.list(),
            Some((_, '\'' | '"')) => Ok(Value::String(self.string()?)),
            Some((_, c)) if c.is_ascii_digit() || *c == '-' || *c == '+' => self.number(),
            Some((_, c)) if c.is_ascii_alphabetic() => self.keyword(),
            Some((at, c)) => bail!("unexpected character {c:?} at byte {at}"),
            None => bail!("unexpected end of input"),
        }
    }

    fn dict(&mut self) -> Result<Value> {
        self.rest.next(); // '{'
        let mut map = Map::new();
        loop {
            self.skip_whitespace();
            match self.rest.peek() {
                Some((_, '}')) => {
                    self.rest.next();
                    return Ok(Value::Object(map));
                }
                Some(_) => {}
                None => bail!("unterminated dict"),
            }
            let key = self.string()?;
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key, value);
            self.skip_whitespace();
            match self.rest.next() {
                Some((_, ',')) => {}
                Some((_, '}')) => return Ok(Value::Object(map)),
                Some((at, c)) => bail!("expected ',' or '}}', found {c:?} at byte {at}"),
                None => bail!("unterminated dict"),
            }
        }
    }

    fn list(&mut self) -> Result<Value> {
        self.rest.next(); // '['
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if let Some((_, ']')) = self.rest.peek() {
                self.rest.next();
                return Ok(Value::Array(items));
            }
            items.push(self.value()?);
            self.skip_whitespace();
            match self.rest.next() {
                Some((_, ',')) => {}
                Some((_, ']')) => return Ok(Value::Array(items)),
                Some((at, c)) => bail!("expected ',' or ']', found {c:?} at byte {at}"),
                None => bail!("unterminated list"),
            }
        }
    }

    fn string(&mut self) -> Result<String> {
        self.skip_whitespace();
        let quote = match self.rest.next() {
            Some((_, c @ ('\'' | '"'))) => c,
            Some((at, c)) => bail!("expected a string, found {c:?} at byte {at}"),
            None => bail!("expected a string, found end of input"),
        };
        let mut out = String::new();
        loop {
            match self.rest.next() {
                Some((_, c)) if c == quote => return Ok(out),
                Some((_, '\\')) => match self.rest.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, c @ ('\\' | '\'' | '"'))) => out.push(c),
                    // Unknown escapes pass through unchanged.
                    Some((_, c)) => {
                        out.push('\\');
                        out.push(c);
                    }
                    None => bail!("unterminated string"),
                },
                Some((_, c)) => out.push(c),
                None => bail!("unterminated string"),
            }
        }
    }

    fn number(&mut self) -> Result<Value> {
        let start = match self.rest.peek() {
            Some((at, _)) => *at,
            None => bail!("expected a number"),
        };
        let mut end = start;
        while let Some((at, c)) = self.rest.peek() {
            if c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E') {
                end = at + c.len_utf8();
                self.rest.next();
            } else {
                break;
            }
        }
        let raw = &self.input[start..end];
        if let Ok(int) = raw.parse::<i64>() {
            return Ok(Value::Number(int.into()));
        }
        let float: f64 = raw.parse()?;
        match Number::from_f64(float) {
            Some(number) => Ok(Value::Number(number)),
            None => bail!("number {raw:?} is not representable"),
        }
    }

    fn keyword(&mut self) -> Result<Value> {
        let start = match self.rest.peek() {
            Some((at, _)) => *at,
            None => bail!("expected a keyword"),
        };
        let mut end = start;
        while let Some((at, c)) = self.rest.peek() {
            if c.is_ascii_alphabetic() {
                end = at + c.len_utf8();
                self.rest.next();
            } else {
                break;
            }
        }
        match &self.input[start..end] {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            "None" | "null" => Ok(Value::Null),
            other => bail!("unknown literal {other:?}"),
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        self.skip_whitespace();
        match self.rest.next() {
            Some((_, c)) if c == expected => Ok(()),
            Some((at, c)) => bail!("expected {expected:?}, found {c:?} at byte {at}"),
            None => bail!("expected {expected:?}, found end of input"),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some((_, c)) = self.rest.peek() {
            if c.is_whitespace() {
                self.rest.next();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_json_parses_unchanged() {
        let value = parse(r#"{"key_id": "k1", "count": 3}"#).unwrap();
        assert_eq!(value, json!({"key_id": "k1", "count": 3}));
    }

    #[test]
    fn python_dict_repr_parses() {
        let value =
            parse("{'key_id': 'k1', 'api_id': 'api1', 'stage': 'prod', 'status': '200'}").unwrap();
        assert_eq!(
            value,
            json!({"key_id": "k1", "api_id": "api1", "stage": "prod", "status": "200"})
        );
    }

    #[test]
    fn python_keywords_become_json_values() {
        let value = parse("{'ok': True, 'failed': False, 'error': None}").unwrap();
        assert_eq!(value, json!({"ok": true, "failed": false, "error": null}));
    }

    #[test]
    fn numbers_keep_their_shape() {
        let value = parse("{'count': 42, 'latency': 1.5, 'delta': -3}").unwrap();
        assert_eq!(value, json!({"count": 42, "latency": 1.5, "delta": -3}));
    }

    #[test]
    fn nested_structures_parse() {
        let value = parse("{'tags': ['a', 'b'], 'inner': {'x': 1}}").unwrap();
        assert_eq!(value, json!({"tags": ["a", "b"], "inner": {"x": 1}}));
    }

    #[test]
    fn escaped_quotes_inside_strings() {
        let value = parse(r"{'msg': 'it\'s fine', 'path': 'a\nb'}").unwrap();
        assert_eq!(value, json!({"msg": "it's fine", "path": "a\nb"}));
    }

    #[test]
    fn trailing_commas_are_tolerated() {
        let value = parse("{'a': 1, 'b': [1, 2,],}").unwrap();
        assert_eq!(value, json!({"a": 1, "b": [1, 2]}));
    }

    #[test]
    fn double_quoted_python_strings_parse() {
        let value = parse("{\"a\": 'mixed'}").unwrap();
        assert_eq!(value, json!({"a": "mixed"}));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse("not a payload").is_err());
        assert!(parse("{'a': }").is_err());
        assert!(parse("{'a': 1} trailing").is_err());
        assert!(parse("{'unterminated': 'oops").is_err());
        assert!(parse("").is_err());
    }
}
