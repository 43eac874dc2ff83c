// Contract workflow core
//
// Pure state machine over contract documents: status taxonomy, approval gate,
// amendment sub-state and the transition function. Storage and delivery live
// in the service layer.

pub mod amendment;
pub mod approval;
pub mod patch;
pub mod progress;
pub mod status;
pub mod transition;

use thiserror::Error;

pub use amendment::AmendmentStage;
pub use approval::{
    evaluate as evaluate_approvals, ApprovalRecord, ApprovalVerdict, ApproverCategory, Approvers,
    MissingApproval,
};
pub use patch::{ContractPatch, FieldUpdate, TimelineEvent};
pub use progress::{progress, ProgressMarker};
pub use status::ContractStatus;
pub use transition::{
    transition, transition_str, Rejection, RequestedState, TransitionOutcome, TransitionRule,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Unknown contract status: {0}")]
    UnknownStatus(String),
    #[error("Unknown amendment stage: {0}")]
    UnknownStage(String),
    #[error("Unknown transition target: {0}")]
    UnknownTarget(String),
    #[error("Unknown approver category: {0}")]
    UnknownApproverCategory(String),
}
