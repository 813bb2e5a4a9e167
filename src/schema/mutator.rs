//! Schema Mutator
//!
//! Front end for registry changes on one replica. Nothing here decides a
//! race: every change becomes a log entry and the ordered apply path
//! resolves it, so two shards defining the same name at once get a single
//! winner no matter which one the caller talks to.

use std::collections::BTreeSet;
use std::time::Duration;

use super::errors::SchemaError;
use super::parser::is_valid_attribute_name;
use super::registry::SchemaRegistry;
use super::types::{AttributeDefinition, AttributeSchema, IndexKind, NamedDefinition};
use crate::consensus::{LogEntry, LogIndex};
use crate::errors::{GateError, GateResult};
use crate::replica::{ApplyOutcome, Proposer, RejectCause};

#[derive(Clone)]
pub struct SchemaMutator {
    proposer: Proposer,
}

impl SchemaMutator {
    pub fn new(proposer: Proposer) -> Self {
        Self { proposer }
    }

    /// Same mutator with a caller-supplied proposal timeout
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self::new(self.proposer.with_timeout(timeout))
    }

    /// Local read of the last applied entry for `name`. Non-blocking.
    pub fn lookup(&self, name: &str) -> Option<AttributeSchema> {
        self.proposer.replica().lookup(name)
    }

    pub fn registry(&self) -> SchemaRegistry {
        self.proposer.replica().registry()
    }

    /// Define one attribute, owned by this replica's shard if it wins.
    ///
    /// An identical committed definition is returned as success, and one
    /// this definition only adds indexes to is extended. Any other
    /// committed definition is a `SchemaConflict`.
    pub async fn define(
        &self,
        name: &str,
        definition: AttributeDefinition,
    ) -> GateResult<AttributeSchema> {
        let mut entries = self
            .define_all(vec![NamedDefinition::new(name, definition)])
            .await?;
        entries
            .pop()
            .ok_or_else(|| GateError::invalid_request("define produced no entry"))
    }

    /// Define several attributes in one all-or-nothing log entry.
    pub async fn define_all(
        &self,
        definitions: Vec<NamedDefinition>,
    ) -> GateResult<Vec<AttributeSchema>> {
        self.submit_define(definitions, false).await
    }

    /// Define-if-absent for attributes first seen in a data mutation.
    ///
    /// Existing entries win over the inferred definitions.
    pub async fn define_implicit(
        &self,
        definitions: Vec<NamedDefinition>,
    ) -> GateResult<Vec<AttributeSchema>> {
        self.submit_define(definitions, true).await
    }

    async fn submit_define(
        &self,
        definitions: Vec<NamedDefinition>,
        implicit: bool,
    ) -> GateResult<Vec<AttributeSchema>> {
        if definitions.is_empty() {
            return Ok(Vec::new());
        }
        for named in &definitions {
            if !is_valid_attribute_name(&named.name) {
                return Err(
                    SchemaError::invalid_definition(&named.name, "invalid predicate name").into(),
                );
            }
            named
                .definition
                .validate()
                .map_err(|reason| SchemaError::invalid_definition(&named.name, reason))?;
        }

        let entry = LogEntry::Define {
            attributes: definitions,
            requesting_shard: self.proposer.replica().shard(),
            implicit,
        };
        let (index, outcome) = self.proposer.submit(entry).await?;
        let metrics = self.proposer.metrics();
        match outcome {
            ApplyOutcome::Defined { entries, created } => {
                metrics.add_defines_committed(created.len() as u64);
                if implicit {
                    metrics.add_implicit_definitions(created.len() as u64);
                }
                Ok(entries)
            }
            ApplyOutcome::Rejected { cause } => {
                if matches!(cause, RejectCause::Conflict { .. }) {
                    metrics.increment_defines_conflicted();
                }
                Err(cause.into())
            }
            other => Err(unexpected(index, &other)),
        }
    }

    /// Append index kinds to an existing attribute. Already-present kinds
    /// are a no-op success.
    pub async fn extend_indexes(
        &self,
        name: &str,
        indexes: BTreeSet<IndexKind>,
    ) -> GateResult<AttributeSchema> {
        if indexes.is_empty() {
            return self
                .lookup(name)
                .ok_or_else(|| GateError::unknown_attributes(vec![name.to_string()]));
        }
        let entry = LogEntry::ExtendIndexes {
            attribute: name.to_string(),
            indexes,
        };
        let (index, outcome) = self.proposer.submit(entry).await?;
        match outcome {
            ApplyOutcome::Extended { entry, .. } => Ok(entry),
            ApplyOutcome::Rejected { cause } => Err(cause.into()),
            other => Err(unexpected(index, &other)),
        }
    }

    /// Clear the registry and wipe every shard's data in one commit.
    pub async fn drop_all(&self) -> GateResult<()> {
        let (index, outcome) = self.proposer.submit(LogEntry::DropAll).await?;
        match outcome {
            ApplyOutcome::Dropped { .. } => {
                self.proposer.metrics().increment_drop_alls();
                Ok(())
            }
            ApplyOutcome::Rejected { cause } => Err(cause.into()),
            other => Err(unexpected(index, &other)),
        }
    }
}

fn unexpected(index: LogIndex, outcome: &ApplyOutcome) -> GateError {
    GateError::invalid_request(format!(
        "log index {} applied with unexpected outcome {:?}",
        index, outcome
    ))
}
