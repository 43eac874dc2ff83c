// Contract transition function
//
// Requests are classified into a closed set of rules, in priority order:
//   1. approval gate
//   2. amendment entry
//   3. amendment stage change
//   4. amendment exit
//   5. plain status change
// The result is a patch or a user-facing rejection; nothing here touches storage.

use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use super::amendment::{self, AmendmentStage};
use super::approval::{self, ApprovalVerdict};
use super::patch::{ContractPatch, TimelineEvent};
use super::{ContractStatus, WorkflowError};
use crate::contract::{Contract, RESERVED_FIELDS};

pub const STATUS_CHANGED: &str = "Status Changed";

/// Target named by the caller, before it is interpreted against the contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedState {
    Status(ContractStatus),
    Stage(AmendmentStage),
}

impl FromStr for RequestedState {
    type Err = WorkflowError;

    /// `amendment` names both a status and a stage; it parses as the status
    /// and is reinterpreted when the contract is already in amendment mode.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(status) = s.parse::<ContractStatus>() {
            return Ok(RequestedState::Status(status));
        }
        s.parse::<AmendmentStage>()
            .map(RequestedState::Stage)
            .map_err(|_| WorkflowError::UnknownTarget(s.to_string()))
    }
}

impl From<ContractStatus> for RequestedState {
    fn from(status: ContractStatus) -> Self {
        RequestedState::Status(status)
    }
}

impl From<AmendmentStage> for RequestedState {
    fn from(stage: AmendmentStage) -> Self {
        RequestedState::Stage(stage)
    }
}

/// Which rule handles a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionRule {
    ApprovalGate,
    EnterAmendment { from: ContractStatus },
    ChangeStage { current: Option<AmendmentStage>, requested: AmendmentStage },
    ExitAmendment {
        stage: AmendmentStage,
        original: Option<ContractStatus>,
        requested: ContractStatus,
    },
    SetStatus(ContractStatus),
}

impl TransitionRule {
    pub fn classify(contract: &Contract, requested: RequestedState) -> Self {
        let active_stage = contract.active_amendment_stage();
        match (requested, active_stage) {
            (RequestedState::Status(ContractStatus::Approval), _) => TransitionRule::ApprovalGate,
            (RequestedState::Status(ContractStatus::Amendment), None)
                if contract.status != ContractStatus::Amendment =>
            {
                TransitionRule::EnterAmendment {
                    from: contract.status,
                }
            }
            (RequestedState::Status(ContractStatus::Amendment), Some(stage)) => {
                TransitionRule::ChangeStage {
                    current: Some(stage),
                    requested: AmendmentStage::Amendment,
                }
            }
            (RequestedState::Stage(requested), current) => TransitionRule::ChangeStage {
                current,
                requested,
            },
            (RequestedState::Status(requested), Some(stage)) => TransitionRule::ExitAmendment {
                stage,
                original: contract.original_status,
                requested,
            },
            (RequestedState::Status(status), None) => TransitionRule::SetStatus(status),
        }
    }
}

/// Why a request was refused; `Display` is the user facing reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    ApprovalGate(ApprovalVerdict),
    StageSkip { from: AmendmentStage, to: AmendmentStage },
    NotInAmendment { requested: AmendmentStage },
    AmendmentIncomplete { stage: AmendmentStage },
    WrongReturnStatus { expected: ContractStatus, requested: ContractStatus },
    MissingOriginalStatus,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::ApprovalGate(verdict) => f.write_str(
                verdict
                    .reason()
                    .as_deref()
                    .unwrap_or("Cannot move to approval"),
            ),
            Rejection::StageSkip { from, to } => write!(
                f,
                "Cannot move from the {} stage to the {} stage; stages must be completed in order",
                from.label(),
                to.label()
            ),
            Rejection::NotInAmendment { .. } => f.write_str(
                "Amendment stages can only be changed while the contract is under amendment",
            ),
            Rejection::AmendmentIncomplete { .. } => f.write_str(
                "The amendment process must be completed before changing the contract status",
            ),
            Rejection::WrongReturnStatus { expected, .. } => {
                write!(f, "The amendment must return to {}", expected.label())
            }
            Rejection::MissingOriginalStatus => {
                f.write_str("The status before the amendment is unknown; it cannot be restored")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Accepted(ContractPatch),
    Rejected(Rejection),
}

impl TransitionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, TransitionOutcome::Accepted(_))
    }

    pub fn patch(&self) -> Option<&ContractPatch> {
        match self {
            TransitionOutcome::Accepted(patch) => Some(patch),
            TransitionOutcome::Rejected(_) => None,
        }
    }

    pub fn reason(&self) -> Option<String> {
        match self {
            TransitionOutcome::Accepted(_) => None,
            TransitionOutcome::Rejected(rejection) => Some(rejection.to_string()),
        }
    }
}

impl From<Result<ContractPatch, Rejection>> for TransitionOutcome {
    fn from(result: Result<ContractPatch, Rejection>) -> Self {
        match result {
            Ok(patch) => TransitionOutcome::Accepted(patch),
            Err(rejection) => TransitionOutcome::Rejected(rejection),
        }
    }
}

/// Decide a requested transition for `contract`
pub fn transition(
    contract: &Contract,
    requested: RequestedState,
    extra: Option<Map<String, Value>>,
) -> TransitionOutcome {
    let rule = TransitionRule::classify(contract, requested);
    debug!(contract_id = %contract.id, rule = ?rule, "Classified transition request");

    match rule {
        TransitionRule::ApprovalGate => {
            if let Some(stage) = contract.active_amendment_stage().filter(|s| !s.is_final()) {
                return TransitionOutcome::Rejected(Rejection::AmendmentIncomplete { stage });
            }
            let verdict = approval::evaluate(&contract.approvers);
            if !verdict.allowed() {
                return TransitionOutcome::Rejected(Rejection::ApprovalGate(verdict));
            }
            match contract.active_amendment_stage() {
                Some(stage) => exit_amendment(contract, stage, ContractStatus::Approval).into(),
                None => TransitionOutcome::Accepted(set_status(
                    contract,
                    ContractStatus::Approval,
                    extra,
                )),
            }
        }
        TransitionRule::EnterAmendment { from } => {
            TransitionOutcome::Accepted(amendment::enter(from))
        }
        TransitionRule::ChangeStage { current: None, requested } => {
            TransitionOutcome::Rejected(Rejection::NotInAmendment { requested })
        }
        TransitionRule::ChangeStage {
            current: Some(current),
            requested,
        } => amendment::change_stage(current, requested).into(),
        TransitionRule::ExitAmendment { stage, requested, .. } => {
            exit_amendment(contract, stage, requested).into()
        }
        TransitionRule::SetStatus(status) => {
            TransitionOutcome::Accepted(set_status(contract, status, extra))
        }
    }
}

/// Parse `requested` and decide the transition
pub fn transition_str(
    contract: &Contract,
    requested: &str,
    extra: Option<Map<String, Value>>,
) -> Result<TransitionOutcome, WorkflowError> {
    let requested = requested.parse::<RequestedState>()?;
    Ok(transition(contract, requested, extra))
}

fn exit_amendment(
    contract: &Contract,
    stage: AmendmentStage,
    requested: ContractStatus,
) -> Result<ContractPatch, Rejection> {
    if !stage.is_final() {
        return Err(Rejection::AmendmentIncomplete { stage });
    }
    let original = contract
        .original_status
        .ok_or(Rejection::MissingOriginalStatus)?;
    amendment::exit(stage, original, requested)
}

fn set_status(
    contract: &Contract,
    status: ContractStatus,
    extra: Option<Map<String, Value>>,
) -> ContractPatch {
    if status.is_legacy() {
        warn!(
            contract_id = %contract.id,
            status = %status,
            "Transition into deprecated status"
        );
    }

    let mut patch = ContractPatch::default().with_status(status);
    for (key, value) in extra.unwrap_or_default() {
        if RESERVED_FIELDS.contains(&key.as_str()) {
            warn!(
                contract_id = %contract.id,
                field = %key,
                "Ignoring reserved field in transition data"
            );
            continue;
        }
        patch.extra.insert(key, value);
    }
    if status != contract.status {
        patch = patch.with_event(TimelineEvent::new(
            STATUS_CHANGED,
            format!("{} → {}", contract.status.label(), status.label()),
        ));
    }
    patch
}
