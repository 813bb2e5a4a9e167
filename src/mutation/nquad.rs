//! N-Quad text parsing for Mutate requests
//!
//! One statement per line: `subject <predicate> object .`
//!
//! - subjects: `_:label` or `<0x1f>`
//! - objects: `"literal"` with optional `@lang` or `^^<xs:type>`,
//!   `_:label`, `<uid>`, bare numbers and booleans, or `*` (delete only)
//! - `#` starts a comment outside of quoted literals

use super::errors::{MutationError, MutationResult};
use super::types::{ObjectValue, Subject, Triple};
use crate::schema::is_valid_attribute_name;

/// Parses the set half of a mutation. `*` is rejected.
pub fn parse_set_nquads(text: &str) -> MutationResult<Vec<Triple>> {
    parse_nquads(text, false)
}

/// Parses the delete half of a mutation. `*` deletes every value.
pub fn parse_delete_nquads(text: &str) -> MutationResult<Vec<Triple>> {
    parse_nquads(text, true)
}

fn parse_nquads(text: &str, allow_wildcard: bool) -> MutationResult<Vec<Triple>> {
    let mut triples = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut cursor = Cursor::new(line, idx + 1);
        let triple = cursor.statement()?;
        if triple.object == ObjectValue::Wildcard && !allow_wildcard {
            return Err(MutationError::parse(idx + 1, "'*' is only valid in deletes"));
        }
        triples.push(triple);
    }
    Ok(triples)
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str, line: usize) -> Self {
        Self { src, pos: 0, line }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn error(&self, message: impl Into<String>) -> MutationError {
        MutationError::parse(self.line, message)
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn expect(&mut self, expected: char) -> MutationResult<()> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(self.error(format!("expected '{}', found '{}'", expected, c))),
            None => Err(self.error(format!("expected '{}', found end of line", expected))),
        }
    }

    fn take_while(&mut self, keep: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let end = rest.find(|c: char| !keep(c)).unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }

    fn statement(&mut self) -> MutationResult<Triple> {
        self.skip_ws();
        let subject = self.subject()?;
        self.skip_ws();
        let predicate = self.predicate()?;
        self.skip_ws();
        let (object, terminated) = self.object()?;

        if !terminated {
            self.skip_ws();
            self.expect('.')?;
        }
        self.skip_ws();
        if !(self.rest().is_empty() || self.rest().starts_with('#')) {
            return Err(self.error(format!("unexpected trailing input '{}'", self.rest())));
        }

        Ok(Triple::new(subject, predicate, object))
    }

    fn subject(&mut self) -> MutationResult<Subject> {
        if self.rest().starts_with("_:") {
            self.blank_node()
        } else if self.peek() == Some('<') {
            let iri = self.iri()?;
            Ok(Subject::Uid(self.uid(iri)?))
        } else {
            Err(self.error("subject must be a blank node or <uid>"))
        }
    }

    fn blank_node(&mut self) -> MutationResult<Subject> {
        self.pos += 2;
        let label = self.take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '-'));
        if label.is_empty() {
            return Err(self.error("empty blank node label"));
        }
        Ok(Subject::Blank(label.to_string()))
    }

    fn predicate(&mut self) -> MutationResult<String> {
        if self.peek() != Some('<') {
            return Err(self.error("predicate must be written as <name>"));
        }
        let name = self.iri()?;
        if !is_valid_attribute_name(name) {
            return Err(self.error(format!("invalid predicate name '{}'", name)));
        }
        Ok(name.to_string())
    }

    /// Parses the object; returns whether the `.` terminator was consumed.
    fn object(&mut self) -> MutationResult<(ObjectValue, bool)> {
        match self.peek() {
            Some('"') => Ok((self.literal()?, false)),
            Some('<') => {
                let iri = self.iri()?;
                let target = Subject::Uid(self.uid(iri)?);
                Ok((ObjectValue::Node { target }, false))
            }
            Some('_') if self.rest().starts_with("_:") => {
                let target = self.blank_node()?;
                Ok((ObjectValue::Node { target }, false))
            }
            Some('*') => {
                self.bump();
                Ok((ObjectValue::Wildcard, false))
            }
            Some(_) => self.bare_token(),
            None => Err(self.error("missing object")),
        }
    }

    fn iri(&mut self) -> MutationResult<&'a str> {
        self.expect('<')?;
        let inner = self.take_while(|c| c != '>');
        self.expect('>')?;
        Ok(inner.trim())
    }

    fn uid(&self, iri: &str) -> MutationResult<u64> {
        let parsed = match iri.strip_prefix("0x").or_else(|| iri.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => iri.parse::<u64>().ok(),
        };
        match parsed {
            Some(0) | None => Err(self.error(format!("invalid uid '{}'", iri))),
            Some(uid) => Ok(uid),
        }
    }

    fn quoted(&mut self) -> MutationResult<String> {
        self.expect('"')?;
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(value),
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some(c) => value.push(c),
                    None => return Err(self.error("unterminated escape")),
                },
                Some(c) => value.push(c),
                None => return Err(self.error("unterminated string literal")),
            }
        }
    }

    fn literal(&mut self) -> MutationResult<ObjectValue> {
        let value = self.quoted()?;

        if self.peek() == Some('@') {
            self.bump();
            let lang = self.take_while(|c| c.is_alphanumeric() || c == '-');
            if lang.is_empty() {
                return Err(self.error("empty language tag"));
            }
            return Ok(ObjectValue::Str {
                value,
                lang: Some(lang.to_string()),
            });
        }

        if self.rest().starts_with("^^") {
            self.pos += 2;
            let datatype = self.iri()?;
            return self.typed(value, datatype);
        }

        Ok(ObjectValue::string(value))
    }

    fn typed(&self, value: String, datatype: &str) -> MutationResult<ObjectValue> {
        let bad = |ty: &str| self.error(format!("'{}' is not a valid {}", value, ty));
        match datatype {
            "xs:string" => Ok(ObjectValue::string(value)),
            "xs:int" | "xs:integer" => value
                .trim()
                .parse()
                .map(|value| ObjectValue::Int { value })
                .map_err(|_| bad("int")),
            "xs:float" | "xs:double" => value
                .trim()
                .parse()
                .map(|value| ObjectValue::Float { value })
                .map_err(|_| bad("float")),
            "xs:boolean" => value
                .trim()
                .parse()
                .map(|value| ObjectValue::Bool { value })
                .map_err(|_| bad("boolean")),
            "xs:dateTime" => Ok(ObjectValue::DateTime { value }),
            other => Err(self.error(format!("unsupported datatype '{}'", other))),
        }
    }

    fn bare_token(&mut self) -> MutationResult<(ObjectValue, bool)> {
        let mut token = self.take_while(|c| !c.is_whitespace());
        let mut terminated = false;
        if self.rest().trim().is_empty() || self.rest().trim_start().starts_with('#') {
            if let Some(stripped) = token.strip_suffix('.') {
                token = stripped;
                terminated = true;
            }
        }

        let value = match token {
            "true" => ObjectValue::Bool { value: true },
            "false" => ObjectValue::Bool { value: false },
            _ => {
                if let Ok(value) = token.parse::<i64>() {
                    ObjectValue::Int { value }
                } else if let Ok(value) = token.parse::<f64>() {
                    ObjectValue::Float { value }
                } else {
                    return Err(self.error(format!("unquoted object '{}'", token)));
                }
            }
        };
        Ok((value, terminated))
    }
}
