//! Data mutation types
//!
//! A DataChange is a batch of (entity, attribute, value) triples to set and
//! to delete. It carries a request id so the owning shard can recognise a
//! retried delivery of a batch it already applied.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{AttributeDefinition, ValueType};

/// Entity a triple is about
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Subject {
    /// Request-local label (`_:alice`)
    Blank(String),
    /// Existing entity (`<0x1f>`)
    Uid(u64),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Blank(label) => write!(f, "_:{}", label),
            Subject::Uid(uid) => write!(f, "<{:#x}>", uid),
        }
    }
}

/// Object position of a triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectValue {
    Str { value: String, lang: Option<String> },
    Int { value: i64 },
    Float { value: f64 },
    Bool { value: bool },
    DateTime { value: String },
    /// Edge to another entity
    Node { target: Subject },
    /// `*` in a delete: every value of the attribute
    Wildcard,
}

impl ObjectValue {
    pub fn string(value: impl Into<String>) -> Self {
        ObjectValue::Str {
            value: value.into(),
            lang: None,
        }
    }

    /// Definition used when an attribute is defined on first use.
    ///
    /// Untagged strings infer `default` so later typed definitions of the
    /// same value remain readable.
    pub fn inferred_definition(&self) -> AttributeDefinition {
        match self {
            ObjectValue::Str { lang: Some(_), .. } => {
                let mut def = AttributeDefinition::new(ValueType::String);
                def.lang = true;
                def
            }
            ObjectValue::Str { .. } | ObjectValue::Wildcard => {
                AttributeDefinition::new(ValueType::Default)
            }
            ObjectValue::Int { .. } => AttributeDefinition::new(ValueType::Int),
            ObjectValue::Float { .. } => AttributeDefinition::new(ValueType::Float),
            ObjectValue::Bool { .. } => AttributeDefinition::new(ValueType::Bool),
            ObjectValue::DateTime { .. } => AttributeDefinition::new(ValueType::DateTime),
            ObjectValue::Node { .. } => AttributeDefinition::new(ValueType::Uid).as_list(),
        }
    }
}

/// One (entity, attribute, value) statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Subject,
    pub predicate: String,
    pub object: ObjectValue,
}

impl Triple {
    pub fn new(subject: Subject, predicate: impl Into<String>, object: ObjectValue) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
        }
    }

    /// Whether this delete pattern removes `stored`
    pub fn matches(&self, stored: &Triple) -> bool {
        self.subject == stored.subject
            && self.predicate == stored.predicate
            && (self.object == ObjectValue::Wildcard || self.object == stored.object)
    }
}

/// A set/delete batch, admitted and routed as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataChange {
    pub request_id: Uuid,
    #[serde(default)]
    pub set: Vec<Triple>,
    #[serde(default)]
    pub delete: Vec<Triple>,
}

impl DataChange {
    /// New batch with a fresh request id
    pub fn new(set: Vec<Triple>, delete: Vec<Triple>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            set,
            delete,
        }
    }

    /// Every attribute the batch touches, sorted and deduplicated
    pub fn attributes(&self) -> BTreeSet<&str> {
        self.set
            .iter()
            .chain(self.delete.iter())
            .map(|t| t.predicate.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.delete.is_empty()
    }

    /// Definition to infer for `attribute`, taken from its first set value.
    pub fn inferred_definition(&self, attribute: &str) -> AttributeDefinition {
        self.set
            .iter()
            .chain(self.delete.iter())
            .find(|t| t.predicate == attribute)
            .map(|t| t.object.inferred_definition())
            .unwrap_or_else(|| AttributeDefinition::new(ValueType::Default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_cover_set_and_delete() {
        let change = DataChange::new(
            vec![
                Triple::new(Subject::Blank("a".into()), "name", ObjectValue::string("Alice")),
                Triple::new(Subject::Blank("a".into()), "age", ObjectValue::Int { value: 5 }),
            ],
            vec![Triple::new(Subject::Uid(1), "name", ObjectValue::Wildcard)],
        );
        let attrs: Vec<&str> = change.attributes().into_iter().collect();
        assert_eq!(attrs, vec!["age", "name"]);
    }

    #[test]
    fn test_inferred_definitions() {
        assert_eq!(
            ObjectValue::string("x").inferred_definition().value_type,
            ValueType::Default
        );
        assert_eq!(
            ObjectValue::Int { value: 1 }.inferred_definition().value_type,
            ValueType::Int
        );
        let edge = ObjectValue::Node {
            target: Subject::Uid(9),
        }
        .inferred_definition();
        assert_eq!(edge.value_type, ValueType::Uid);
        assert!(edge.list);
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn test_wildcard_delete_matches_any_value() {
        let stored = Triple::new(Subject::Uid(1), "name", ObjectValue::string("Alice"));
        let pattern = Triple::new(Subject::Uid(1), "name", ObjectValue::Wildcard);
        let other = Triple::new(Subject::Uid(2), "name", ObjectValue::Wildcard);
        assert!(pattern.matches(&stored));
        assert!(!other.matches(&stored));
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = DataChange::new(vec![], vec![]);
        let b = DataChange::new(vec![], vec![]);
        assert_ne!(a.request_id, b.request_id);
        assert!(a.is_empty());
    }
}
