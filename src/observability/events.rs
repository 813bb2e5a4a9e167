//! Observable events
//!
//! Events are explicit and typed; the logged name is stable.

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    ConfigLoaded,
    NodeStarted,
    ClusterStarted,
    ClusterStopped,

    // Ordered apply path
    ModeApplied,
    AttributeDefined,
    AttributeExtended,
    DefineConflict,
    DefineRejected,
    DropAllApplied,
    ReplicaHalted,

    // Request boundary
    AdmissionRejected,
    ImplicitSchemaDefined,
    ProposalTimeout,
    ReadBarrierTimeout,

    // Routing
    MutationRouted,
    RoutingFailed,
    DuplicateDelivery,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::NodeStarted => "NODE_STARTED",
            Event::ClusterStarted => "CLUSTER_STARTED",
            Event::ClusterStopped => "CLUSTER_STOPPED",

            Event::ModeApplied => "MODE_APPLIED",
            Event::AttributeDefined => "ATTRIBUTE_DEFINED",
            Event::AttributeExtended => "ATTRIBUTE_EXTENDED",
            Event::DefineConflict => "DEFINE_CONFLICT",
            Event::DefineRejected => "DEFINE_REJECTED",
            Event::DropAllApplied => "DROP_ALL_APPLIED",
            Event::ReplicaHalted => "REPLICA_HALTED",

            Event::AdmissionRejected => "ADMISSION_REJECTED",
            Event::ImplicitSchemaDefined => "IMPLICIT_SCHEMA_DEFINED",
            Event::ProposalTimeout => "PROPOSAL_TIMEOUT",
            Event::ReadBarrierTimeout => "READ_BARRIER_TIMEOUT",

            Event::MutationRouted => "MUTATION_ROUTED",
            Event::RoutingFailed => "ROUTING_FAILED",
            Event::DuplicateDelivery => "DUPLICATE_DELIVERY",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::ReplicaHalted => Severity::Fatal,
            Event::RoutingFailed => Severity::Error,
            Event::DefineConflict
            | Event::DefineRejected
            | Event::AdmissionRejected
            | Event::ProposalTimeout
            | Event::ReadBarrierTimeout => Severity::Warn,
            Event::MutationRouted | Event::DuplicateDelivery => Severity::Trace,
            _ => Severity::Info,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
