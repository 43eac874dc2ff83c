// Data-only side effects of an accepted transition. The document store applies
// them; nothing in here performs I/O.

use serde_json::{Map, Value};

use super::{AmendmentStage, ContractStatus};

/// Three-way update for optional fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldUpdate<T> {
    #[default]
    Keep,
    Set(T),
    Clear,
}

impl<T: Clone> FieldUpdate<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, FieldUpdate::Keep)
    }

    pub fn apply_to(&self, slot: &mut Option<T>) {
        match self {
            FieldUpdate::Keep => {}
            FieldUpdate::Set(value) => *slot = Some(value.clone()),
            FieldUpdate::Clear => *slot = None,
        }
    }
}

/// Audit entry produced by a transition; timestamped when applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEvent {
    pub action: String,
    pub details: String,
}

impl TimelineEvent {
    pub fn new(action: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            details: details.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContractPatch {
    pub status: Option<ContractStatus>,
    pub is_amended: Option<bool>,
    pub amendment_stage: FieldUpdate<AmendmentStage>,
    pub original_status: FieldUpdate<ContractStatus>,
    /// Caller supplied fields merged verbatim into the document
    pub extra: Map<String, Value>,
    pub timeline: Vec<TimelineEvent>,
}

impl ContractPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.is_amended.is_none()
            && self.amendment_stage.is_keep()
            && self.original_status.is_keep()
            && self.extra.is_empty()
            && self.timeline.is_empty()
    }

    pub fn with_status(mut self, status: ContractStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_event(mut self, event: TimelineEvent) -> Self {
        self.timeline.push(event);
        self
    }

    pub fn has_event(&self, action: &str) -> bool {
        self.timeline.iter().any(|e| e.action == action)
    }
}
