//! Replica request boundary
//!
//! `Node` is what a client-facing handler talks to on one replica:
//!
//! - `alter`: schema text or drop-all
//! - `mutate`: N-Quad set/delete batches
//! - `set_mode`: live mode change through the log
//!
//! Every write goes through the same steps: read barrier, snapshot of the
//! applied mode and registry, `gate::decide`, then the Schema Mutator or
//! the Mutation Router. All failures come back as a `GateError`; none of
//! them stop the replica.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{GateError, GateResult};
use crate::gate::{decide, MutationRequest, SchemaChange};
use crate::membership::ShardId;
use crate::mode::{ClusterMode, ModeStore};
use crate::mutation::{parse_delete_nquads, parse_set_nquads, DataChange, MutationError};
use crate::observability::{log_event, Event, MetricsRegistry};
use crate::replica::{Proposer, ReplicaSnapshot, ReplicaState};
use crate::router::MutationRouter;
use crate::schema::{parse_schema, AttributeSchema, NamedDefinition, SchemaMutator, SchemaRegistry};

/// Alter request body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub drop_all: bool,
}

impl Operation {
    pub fn schema(text: impl Into<String>) -> Self {
        Self {
            schema: text.into(),
            drop_all: false,
        }
    }

    pub fn drop_all() -> Self {
        Self {
            schema: String::new(),
            drop_all: true,
        }
    }
}

/// Mutate request body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    #[serde(default)]
    pub set_nquads: String,
    #[serde(default)]
    pub del_nquads: String,
    /// Reuse to retry a request whose outcome is unknown
    #[serde(default)]
    pub request_id: Option<Uuid>,
}

impl Mutation {
    pub fn set(nquads: impl Into<String>) -> Self {
        Self {
            set_nquads: nquads.into(),
            ..Self::default()
        }
    }

    pub fn delete(nquads: impl Into<String>) -> Self {
        Self {
            del_nquads: nquads.into(),
            ..Self::default()
        }
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlterResponse {
    /// Committed entries for every attribute the request named
    pub entries: Vec<AttributeSchema>,
    pub dropped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationResponse {
    pub request_id: Uuid,
    pub shards: Vec<ShardId>,
    pub written: usize,
    /// Attributes that were undefined when the request was admitted
    pub implicitly_defined: Vec<String>,
}

/// One replica's write path
pub struct Node {
    replica: Arc<ReplicaState>,
    proposer: Proposer,
    modes: ModeStore,
    schema: SchemaMutator,
    router: MutationRouter,
    metrics: Arc<MetricsRegistry>,
}

impl Node {
    pub fn new(proposer: Proposer, router: MutationRouter) -> Self {
        let replica = proposer.replica().clone();
        let metrics = proposer.metrics().clone();
        Self {
            replica,
            modes: ModeStore::new(proposer.clone()),
            schema: SchemaMutator::new(proposer.clone()),
            proposer,
            router,
            metrics,
        }
    }

    pub fn replica_id(&self) -> Uuid {
        self.replica.replica_id()
    }

    pub fn shard(&self) -> ShardId {
        self.replica.shard()
    }

    pub fn replica(&self) -> &Arc<ReplicaState> {
        &self.replica
    }

    pub fn mode_store(&self) -> &ModeStore {
        &self.modes
    }

    pub fn schema_mutator(&self) -> &SchemaMutator {
        &self.schema
    }

    /// Local mode, no barrier
    pub fn mode(&self) -> ClusterMode {
        self.modes.get()
    }

    /// Local registry, no barrier
    pub fn registry(&self) -> SchemaRegistry {
        self.schema.registry()
    }

    pub fn lookup(&self, name: &str) -> Option<AttributeSchema> {
        self.schema.lookup(name)
    }

    /// Mode and registry after catching up with the log
    pub async fn read_committed(&self) -> GateResult<ReplicaSnapshot> {
        self.prepare().await
    }

    /// Registry as schema text, one attribute per line
    pub fn schema_text(&self) -> String {
        schema_text(&self.registry())
    }

    /// Change the cluster mode. Always admitted, so a disallowed cluster
    /// can be reopened.
    pub async fn set_mode(&self, mode: ClusterMode) -> GateResult<ClusterMode> {
        self.replica.check_serving()?;
        self.modes.propose(mode).await
    }

    /// Alter: define attributes from schema text, or drop everything.
    pub async fn alter(&self, operation: &Operation) -> GateResult<AlterResponse> {
        let snapshot = self.prepare().await?;
        // Malformed requests are refused the same way in disallow mode.
        if snapshot.mode == ClusterMode::Disallow {
            return Err(self.rejected("alter", GateError::ModeRejection));
        }

        let change = if operation.drop_all {
            SchemaChange::DropAll
        } else {
            let definitions = parse_schema(&operation.schema)?;
            if definitions.is_empty() {
                return Err(GateError::invalid_request("schema is empty"));
            }
            SchemaChange::Define { definitions }
        };
        self.apply_schema_change_on(snapshot, change).await
    }

    /// Admit and apply an already-built schema change.
    pub async fn apply_schema_change(&self, change: SchemaChange) -> GateResult<AlterResponse> {
        let snapshot = self.prepare().await?;
        self.apply_schema_change_on(snapshot, change).await
    }

    async fn apply_schema_change_on(
        &self,
        snapshot: ReplicaSnapshot,
        change: SchemaChange,
    ) -> GateResult<AlterResponse> {
        let request = MutationRequest::Schema(change);
        let kind = request.kind();
        if let Err(err) = decide(&request, snapshot.mode, &snapshot.registry).into_result() {
            return Err(self.rejected(kind, err));
        }
        self.metrics.increment_admissions_allowed();

        let MutationRequest::Schema(change) = request else {
            return Err(GateError::invalid_request("expected a schema change"));
        };
        match change {
            SchemaChange::Define { definitions } => Ok(AlterResponse {
                entries: self.schema.define_all(definitions).await?,
                dropped: false,
            }),
            SchemaChange::ExtendIndexes { attribute, indexes } => Ok(AlterResponse {
                entries: vec![self.schema.extend_indexes(&attribute, indexes).await?],
                dropped: false,
            }),
            SchemaChange::DropAll => {
                self.schema.drop_all().await?;
                Ok(AlterResponse {
                    entries: Vec::new(),
                    dropped: true,
                })
            }
        }
    }

    /// Mutate: parse N-Quads and apply them on the owning shards.
    pub async fn mutate(&self, mutation: &Mutation) -> GateResult<MutationResponse> {
        let snapshot = self.prepare().await?;
        if snapshot.mode == ClusterMode::Disallow {
            return Err(self.rejected("data", GateError::ModeRejection));
        }

        let set = parse_set_nquads(&mutation.set_nquads)?;
        let delete = parse_delete_nquads(&mutation.del_nquads)?;
        if set.is_empty() && delete.is_empty() {
            return Err(MutationError::Empty.into());
        }
        let change = DataChange {
            request_id: mutation.request_id.unwrap_or_else(Uuid::new_v4),
            set,
            delete,
        };
        self.mutate_change_on(snapshot, change).await
    }

    /// Admit and route an already-parsed DataChange.
    pub async fn mutate_change(&self, change: DataChange) -> GateResult<MutationResponse> {
        let snapshot = self.prepare().await?;
        self.mutate_change_on(snapshot, change).await
    }

    async fn mutate_change_on(
        &self,
        snapshot: ReplicaSnapshot,
        change: DataChange,
    ) -> GateResult<MutationResponse> {
        let request = MutationRequest::Data(change);
        let missing = match decide(&request, snapshot.mode, &snapshot.registry).into_result() {
            Ok(missing) => missing,
            Err(err) => return Err(self.rejected("data", err)),
        };
        self.metrics.increment_admissions_allowed();

        let MutationRequest::Data(change) = request else {
            return Err(GateError::invalid_request("expected a data change"));
        };

        let mut registry = snapshot.registry;
        let mut implicitly_defined = Vec::new();
        if !missing.is_empty() {
            let definitions: Vec<NamedDefinition> = missing
                .iter()
                .map(|name| NamedDefinition::new(name.as_str(), change.inferred_definition(name)))
                .collect();
            let entries = self.schema.define_implicit(definitions).await?;
            implicitly_defined = entries.into_iter().map(|entry| entry.name).collect();
            let request_id = change.request_id.to_string();
            let names = implicitly_defined.join(",");
            log_event(
                Event::ImplicitSchemaDefined,
                &[("attributes", names.as_str()), ("request_id", request_id.as_str())],
            );
            registry = self.replica.registry();
        }

        let report = self.router.route(&change, &registry).await?;
        Ok(MutationResponse {
            request_id: report.request_id,
            shards: report.shards(),
            written: report.written(),
            implicitly_defined,
        })
    }

    /// Fail fast on a halted replica, catch up with the log, then snapshot.
    async fn prepare(&self) -> GateResult<ReplicaSnapshot> {
        self.replica.check_serving()?;
        self.proposer.read_barrier().await?;
        Ok(self.replica.snapshot())
    }

    fn rejected(&self, kind: &str, err: GateError) -> GateError {
        self.metrics.increment_admissions_rejected();
        let shard = self.shard().to_string();
        let message = err.to_string();
        log_event(
            Event::AdmissionRejected,
            &[
                ("code", err.code()),
                ("message", message.as_str()),
                ("request", kind),
                ("shard", shard.as_str()),
            ],
        );
        err
    }
}

/// Render a registry as schema text, one attribute per line.
pub fn schema_text(registry: &SchemaRegistry) -> String {
    registry
        .iter()
        .map(AttributeSchema::to_schema_line)
        .collect::<Vec<_>>()
        .join("\n")
}
