// contractflow - contract status and approval workflow
// Exposes the workflow core and its service layer for the CLI and tests

pub mod config;
pub mod contract;
pub mod http;
pub mod identity;
pub mod invites;
pub mod notifications;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod workflows;

// Re-export key types for easy access
pub use self::config::{config, ContractflowConfig};
pub use contract::{Contract, ShareEntry, ShareRole, ShareStatus, TimelineEntry};
pub use identity::Actor;
pub use invites::{Invite, InviteError, InviteService, Mailer};
pub use notifications::UnreadCountPoller;
pub use service::{ContractService, Decision, ServiceError};
pub use store::{DocumentStore, FileStore, MemoryStore, StoreError};
pub use telemetry::{
    create_contract_span, generate_correlation_id, init_telemetry, shutdown_telemetry,
};
pub use workflows::{
    progress, transition, AmendmentStage, ApprovalRecord, ApproverCategory, Approvers,
    ContractPatch, ContractStatus, Rejection, RequestedState, TransitionOutcome, WorkflowError,
};
