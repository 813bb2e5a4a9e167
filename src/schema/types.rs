//! Attribute schema types
//!
//! Supported value types:
//! - default: untyped scalar
//! - string, int, float, bool, datetime, geo, password
//! - uid: edge to another entity
//!
//! Any type may be declared as a list (`[string]`).

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::membership::ShardId;

/// Declared value type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Default,
    String,
    Int,
    Float,
    Bool,
    #[serde(rename = "datetime")]
    DateTime,
    Geo,
    Password,
    Uid,
}

impl ValueType {
    /// Returns the type name used in schema text
    pub fn type_name(&self) -> &'static str {
        match self {
            ValueType::Default => "default",
            ValueType::String => "string",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Bool => "bool",
            ValueType::DateTime => "datetime",
            ValueType::Geo => "geo",
            ValueType::Password => "password",
            ValueType::Uid => "uid",
        }
    }

    /// Parse a schema-text type name
    pub fn from_name(name: &str) -> Option<Self> {
        let ty = match name {
            "default" => ValueType::Default,
            "string" => ValueType::String,
            "int" => ValueType::Int,
            "float" => ValueType::Float,
            "bool" => ValueType::Bool,
            "datetime" => ValueType::DateTime,
            "geo" => ValueType::Geo,
            "password" => ValueType::Password,
            "uid" => ValueType::Uid,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Index kinds an attribute may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Exact,
    Hash,
    Term,
    Fulltext,
    Trigram,
    Int,
    Float,
    Bool,
    Year,
    Month,
    Day,
    Hour,
    Geo,
}

impl IndexKind {
    pub fn name(&self) -> &'static str {
        match self {
            IndexKind::Exact => "exact",
            IndexKind::Hash => "hash",
            IndexKind::Term => "term",
            IndexKind::Fulltext => "fulltext",
            IndexKind::Trigram => "trigram",
            IndexKind::Int => "int",
            IndexKind::Float => "float",
            IndexKind::Bool => "bool",
            IndexKind::Year => "year",
            IndexKind::Month => "month",
            IndexKind::Day => "day",
            IndexKind::Hour => "hour",
            IndexKind::Geo => "geo",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "exact" => IndexKind::Exact,
            "hash" => IndexKind::Hash,
            "term" => IndexKind::Term,
            "fulltext" => IndexKind::Fulltext,
            "trigram" => IndexKind::Trigram,
            "int" => IndexKind::Int,
            "float" => IndexKind::Float,
            "bool" => IndexKind::Bool,
            "year" => IndexKind::Year,
            "month" => IndexKind::Month,
            "day" => IndexKind::Day,
            "hour" => IndexKind::Hour,
            "geo" => IndexKind::Geo,
            _ => return None,
        };
        Some(kind)
    }

    /// Whether this index kind can be built over values of `value_type`
    pub fn applies_to(&self, value_type: ValueType) -> bool {
        match self {
            IndexKind::Exact
            | IndexKind::Hash
            | IndexKind::Term
            | IndexKind::Fulltext
            | IndexKind::Trigram => {
                matches!(value_type, ValueType::String | ValueType::Default)
            }
            IndexKind::Int => value_type == ValueType::Int,
            IndexKind::Float => value_type == ValueType::Float,
            IndexKind::Bool => value_type == ValueType::Bool,
            IndexKind::Year | IndexKind::Month | IndexKind::Day | IndexKind::Hour => {
                value_type == ValueType::DateTime
            }
            IndexKind::Geo => value_type == ValueType::Geo,
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Structural definition of an attribute.
///
/// Two definitions are identical iff they are equal; index sets are ordered
/// so equality does not depend on declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub value_type: ValueType,
    #[serde(default)]
    pub list: bool,
    #[serde(default)]
    pub indexes: BTreeSet<IndexKind>,
    #[serde(default)]
    pub reverse: bool,
    #[serde(default)]
    pub count: bool,
    #[serde(default)]
    pub upsert: bool,
    #[serde(default)]
    pub lang: bool,
}

impl AttributeDefinition {
    /// Scalar definition with no directives
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            list: false,
            indexes: BTreeSet::new(),
            reverse: false,
            count: false,
            upsert: false,
            lang: false,
        }
    }

    /// Builder: add an index kind
    pub fn with_index(mut self, kind: IndexKind) -> Self {
        self.indexes.insert(kind);
        self
    }

    /// Builder: declare as list
    pub fn as_list(mut self) -> Self {
        self.list = true;
        self
    }

    /// Builder: reverse edges
    pub fn with_reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// Validates directive/type combinations.
    pub fn validate(&self) -> Result<(), String> {
        for kind in &self.indexes {
            if !kind.applies_to(self.value_type) {
                return Err(format!(
                    "index '{}' is not valid for type {}",
                    kind, self.value_type
                ));
            }
        }
        if self.reverse && self.value_type != ValueType::Uid {
            return Err("@reverse is only valid for type uid".into());
        }
        if self.upsert && self.indexes.is_empty() {
            return Err("@upsert requires an index".into());
        }
        if self.lang && !matches!(self.value_type, ValueType::String | ValueType::Default) {
            return Err("@lang is only valid for string types".into());
        }
        Ok(())
    }

    /// Whether `self` is `committed` plus at least one more index kind,
    /// with every other property unchanged.
    pub fn adds_indexes_to(&self, committed: &AttributeDefinition) -> bool {
        self.value_type == committed.value_type
            && self.list == committed.list
            && self.reverse == committed.reverse
            && self.count == committed.count
            && self.upsert == committed.upsert
            && self.lang == committed.lang
            && self.indexes.is_superset(&committed.indexes)
            && self.indexes.len() > committed.indexes.len()
    }

    /// Whether `indexes` contains a kind this definition does not carry yet
    pub fn is_extended_by(&self, indexes: &BTreeSet<IndexKind>) -> bool {
        !indexes.is_subset(&self.indexes)
    }
}

impl fmt::Display for AttributeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.list {
            write!(f, "[{}]", self.value_type)?;
        } else {
            write!(f, "{}", self.value_type)?;
        }
        if !self.indexes.is_empty() {
            let kinds: Vec<&str> = self.indexes.iter().map(|k| k.name()).collect();
            write!(f, " @index({})", kinds.join(", "))?;
        }
        if self.reverse {
            write!(f, " @reverse")?;
        }
        if self.count {
            write!(f, " @count")?;
        }
        if self.upsert {
            write!(f, " @upsert")?;
        }
        if self.lang {
            write!(f, " @lang")?;
        }
        Ok(())
    }
}

/// A proposed definition for a named attribute, as carried in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedDefinition {
    pub name: String,
    pub definition: AttributeDefinition,
}

impl NamedDefinition {
    pub fn new(name: impl Into<String>, definition: AttributeDefinition) -> Self {
        Self {
            name: name.into(),
            definition,
        }
    }
}

/// Committed schema entry for one attribute.
///
/// Owner is fixed at creation; only index additions bump the version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSchema {
    pub name: String,
    pub definition: AttributeDefinition,
    pub owning_shard: ShardId,
    pub version: u64,
}

impl AttributeSchema {
    /// First committed version of an attribute
    pub fn created(name: impl Into<String>, definition: AttributeDefinition, owner: ShardId) -> Self {
        Self {
            name: name.into(),
            definition,
            owning_shard: owner,
            version: 1,
        }
    }

    /// Schema text for this entry (`name: type @directives .`)
    pub fn to_schema_line(&self) -> String {
        format!("{}: {} .", self.name, self.definition)
    }
}
