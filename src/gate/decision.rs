//! Admission decision
//!
//! | Mode | define | drop-all | data, known | data, unknown |
//! |---|---|---|---|---|
//! | disallow | reject | reject | reject | reject |
//! | strict | allow | allow | allow | reject |
//! | unrestricted | allow | allow | allow | allow + implicit define |
//!
//! A data batch is judged as a whole: in strict mode one unknown attribute
//! rejects the entire batch.

use super::request::MutationRequest;
use crate::errors::{GateError, GateResult};
use crate::mode::ClusterMode;
use crate::schema::SchemaRegistry;

/// Why a request was turned away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    NoMutationsAllowed,
    /// Attributes with no committed entry, sorted
    SchemaNotDefined(Vec<String>),
}

/// Result of the admission gate for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    Allowed,
    /// Allowed once these attributes are implicitly defined
    AllowedWithImplicitSchema(Vec<String>),
    Rejected(RejectReason),
}

impl AdmissionDecision {
    pub fn is_admitted(&self) -> bool {
        !matches!(self, AdmissionDecision::Rejected(_))
    }

    /// Attributes to define before applying (empty unless implicit)
    pub fn into_result(self) -> GateResult<Vec<String>> {
        match self {
            AdmissionDecision::Allowed => Ok(Vec::new()),
            AdmissionDecision::AllowedWithImplicitSchema(missing) => Ok(missing),
            AdmissionDecision::Rejected(RejectReason::NoMutationsAllowed) => {
                Err(GateError::ModeRejection)
            }
            AdmissionDecision::Rejected(RejectReason::SchemaNotDefined(missing)) => {
                Err(GateError::unknown_attributes(missing))
            }
        }
    }
}

/// Pure admission decision. No I/O, no side effects.
pub fn decide(
    request: &MutationRequest,
    mode: ClusterMode,
    registry: &SchemaRegistry,
) -> AdmissionDecision {
    if mode == ClusterMode::Disallow {
        return AdmissionDecision::Rejected(RejectReason::NoMutationsAllowed);
    }

    let change = match request {
        MutationRequest::Schema(_) => return AdmissionDecision::Allowed,
        MutationRequest::Data(change) => change,
    };

    let missing = registry.missing(change.attributes());
    if missing.is_empty() {
        AdmissionDecision::Allowed
    } else if mode.allows_implicit_schema() {
        AdmissionDecision::AllowedWithImplicitSchema(missing)
    } else {
        AdmissionDecision::Rejected(RejectReason::SchemaNotDefined(missing))
    }
}
