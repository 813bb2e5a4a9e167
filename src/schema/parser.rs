//! Schema text parser for Alter requests
//!
//! One statement per line:
//!
//! ```text
//! name: string @index(exact, term) .
//! friend: [uid] @reverse @count .
//! # comments run to end of line
//! ```
//!
//! The whole text is parsed before anything is proposed, so a malformed
//! line rejects the entire Alter.

use std::collections::BTreeMap;

use super::errors::{SchemaError, SchemaResult};
use super::types::{AttributeDefinition, IndexKind, NamedDefinition, ValueType};

/// Whether `name` is a legal attribute name.
pub fn is_valid_attribute_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-' | '~'))
}

/// Parses schema text into definitions in declaration order.
///
/// Repeating an attribute with an identical definition is tolerated;
/// repeating it with a different one is an error.
pub fn parse_schema(text: &str) -> SchemaResult<Vec<NamedDefinition>> {
    let mut order: Vec<String> = Vec::new();
    let mut seen: BTreeMap<String, AttributeDefinition> = BTreeMap::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        }
        .trim();
        if line.is_empty() {
            continue;
        }

        let parsed = parse_statement(line_no, line)?;
        match seen.get(&parsed.name) {
            Some(existing) if *existing == parsed.definition => continue,
            Some(_) => return Err(SchemaError::DuplicateAttribute(parsed.name)),
            None => {
                order.push(parsed.name.clone());
                seen.insert(parsed.name, parsed.definition);
            }
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|name| {
            let definition = seen.remove(&name)?;
            Some(NamedDefinition::new(name, definition))
        })
        .collect())
}

fn parse_statement(line_no: usize, line: &str) -> SchemaResult<NamedDefinition> {
    let body = line
        .strip_suffix('.')
        .ok_or_else(|| SchemaError::parse(line_no, "statement must end with '.'"))?;

    let (name, rest) = body
        .split_once(':')
        .ok_or_else(|| SchemaError::parse(line_no, "expected '<predicate>: <type>'"))?;
    let name = name.trim();
    if !is_valid_attribute_name(name) {
        return Err(SchemaError::parse(
            line_no,
            format!("invalid predicate name '{}'", name),
        ));
    }

    let rest = rest.trim();
    let (type_token, list, mut remaining) = if let Some(inner) = rest.strip_prefix('[') {
        let close = inner
            .find(']')
            .ok_or_else(|| SchemaError::parse(line_no, "unterminated list type"))?;
        (inner[..close].trim(), true, &inner[close + 1..])
    } else {
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '@')
            .unwrap_or(rest.len());
        (&rest[..end], false, &rest[end..])
    };

    let value_type = ValueType::from_name(type_token).ok_or_else(|| {
        SchemaError::parse(line_no, format!("unknown type '{}'", type_token))
    })?;

    let mut definition = AttributeDefinition::new(value_type);
    definition.list = list;

    loop {
        remaining = remaining.trim_start();
        if remaining.is_empty() {
            break;
        }
        let directive = remaining
            .strip_prefix('@')
            .ok_or_else(|| SchemaError::parse(line_no, format!("unexpected '{}'", remaining)))?;

        let ident_end = directive
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(directive.len());
        let ident = &directive[..ident_end];
        let after = &directive[ident_end..];

        let (args, next) = if let Some(open) = after.strip_prefix('(') {
            let close = open
                .find(')')
                .ok_or_else(|| SchemaError::parse(line_no, "unterminated directive arguments"))?;
            let args: Vec<&str> = open[..close]
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .collect();
            (Some(args), &open[close + 1..])
        } else {
            (None, after)
        };
        remaining = next;

        match (ident, args) {
            ("index", Some(args)) if !args.is_empty() => {
                for arg in args {
                    let kind = IndexKind::from_name(arg).ok_or_else(|| {
                        SchemaError::parse(line_no, format!("unknown index kind '{}'", arg))
                    })?;
                    definition.indexes.insert(kind);
                }
            }
            ("index", _) => {
                return Err(SchemaError::parse(line_no, "@index requires at least one kind"));
            }
            ("reverse", None) => definition.reverse = true,
            ("count", None) => definition.count = true,
            ("upsert", None) => definition.upsert = true,
            ("lang", None) => definition.lang = true,
            (other, _) => {
                return Err(SchemaError::parse(
                    line_no,
                    format!("unsupported directive '@{}'", other),
                ));
            }
        }
    }

    definition
        .validate()
        .map_err(|reason| SchemaError::invalid_definition(name, reason))?;

    Ok(NamedDefinition::new(name, definition))
}
