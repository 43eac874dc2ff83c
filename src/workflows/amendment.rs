// Amendment sub-state: a four stage machine nested under primary status
// `amendment`. Stages move one step at a time; leaving the sub-state is only
// possible from the final `counterparty` stage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::approval::{self, Approvers};
use super::patch::{ContractPatch, FieldUpdate, TimelineEvent};
use super::transition::Rejection;
use super::{ContractStatus, WorkflowError};

pub const AMENDMENT_STARTED: &str = "Amendment Started";
pub const AMENDMENT_STAGE_CHANGED: &str = "Amendment Stage Changed";
pub const AMENDMENT_COMPLETED: &str = "Amendment Completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmendmentStage {
    Amendment,
    Legal,
    Wwf,
    Counterparty,
}

impl AmendmentStage {
    pub const ALL: [AmendmentStage; 4] = [
        AmendmentStage::Amendment,
        AmendmentStage::Legal,
        AmendmentStage::Wwf,
        AmendmentStage::Counterparty,
    ];

    pub fn index(&self) -> usize {
        match self {
            AmendmentStage::Amendment => 0,
            AmendmentStage::Legal => 1,
            AmendmentStage::Wwf => 2,
            AmendmentStage::Counterparty => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AmendmentStage::Amendment => "amendment",
            AmendmentStage::Legal => "legal",
            AmendmentStage::Wwf => "wwf",
            AmendmentStage::Counterparty => "counterparty",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AmendmentStage::Amendment => "Amendment",
            AmendmentStage::Legal => "Legal",
            AmendmentStage::Wwf => "WWF",
            AmendmentStage::Counterparty => "Counterparty",
        }
    }

    pub fn next(&self) -> Option<AmendmentStage> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn previous(&self) -> Option<AmendmentStage> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    pub fn is_final(&self) -> bool {
        *self == AmendmentStage::Counterparty
    }

    /// Same stage or one step either way
    pub fn is_reachable_from(&self, current: AmendmentStage) -> bool {
        self.index().abs_diff(current.index()) <= 1
    }
}

impl fmt::Display for AmendmentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AmendmentStage {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        AmendmentStage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == needle)
            .ok_or_else(|| WorkflowError::UnknownStage(s.to_string()))
    }
}

/// Patch for entering amendment mode from `from`
pub fn enter(from: ContractStatus) -> ContractPatch {
    ContractPatch {
        status: Some(ContractStatus::Amendment),
        is_amended: Some(true),
        amendment_stage: FieldUpdate::Set(AmendmentStage::Amendment),
        original_status: FieldUpdate::Set(from),
        ..Default::default()
    }
    .with_event(TimelineEvent::new(
        AMENDMENT_STARTED,
        format!("Amendment started from {}", from.label()),
    ))
}

/// Manual stage change. Requesting the current stage yields an empty patch.
pub fn change_stage(
    current: AmendmentStage,
    requested: AmendmentStage,
) -> Result<ContractPatch, Rejection> {
    if requested == current {
        return Ok(ContractPatch::default());
    }
    if !requested.is_reachable_from(current) {
        return Err(Rejection::StageSkip {
            from: current,
            to: requested,
        });
    }
    Ok(ContractPatch {
        amendment_stage: FieldUpdate::Set(requested),
        ..Default::default()
    }
    .with_event(TimelineEvent::new(
        AMENDMENT_STAGE_CHANGED,
        format!("{} → {}", current.label(), requested.label()),
    )))
}

/// Leave amendment mode, returning the contract to `original`
pub fn exit(
    current: AmendmentStage,
    original: ContractStatus,
    requested: ContractStatus,
) -> Result<ContractPatch, Rejection> {
    if !current.is_final() {
        return Err(Rejection::AmendmentIncomplete { stage: current });
    }
    if requested != original {
        return Err(Rejection::WrongReturnStatus {
            expected: original,
            requested,
        });
    }
    Ok(ContractPatch {
        status: Some(original),
        is_amended: Some(false),
        amendment_stage: FieldUpdate::Clear,
        original_status: FieldUpdate::Clear,
        ..Default::default()
    }
    .with_event(TimelineEvent::new(
        AMENDMENT_COMPLETED,
        format!("Contract returned to {}", original.label()),
    )))
}

/// Next stage when an approver update completed the legal and management
/// sign-offs. Only the blocked to allowed edge advances; updates made while the
/// gate is already open leave the stage alone.
pub fn auto_advance(
    current: AmendmentStage,
    before: &Approvers,
    after: &Approvers,
) -> Option<AmendmentStage> {
    if approval::evaluate(before).allowed() || !approval::evaluate(after).allowed() {
        return None;
    }
    current.next()
}
