// Contract document model and patch application

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::workflows::{AmendmentStage, Approvers, ContractPatch, ContractStatus};

/// Document fields owned by the workflow; caller supplied extra data may not overwrite them
pub const RESERVED_FIELDS: [&str; 12] = [
    "id",
    "title",
    "status",
    "isAmended",
    "amendmentStage",
    "originalStatus",
    "approvers",
    "timeline",
    "sharedWith",
    "ownerId",
    "createdAt",
    "updatedAt",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub status: ContractStatus,
    #[serde(default)]
    pub is_amended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amendment_stage: Option<AmendmentStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_status: Option<ContractStatus>,
    #[serde(default)]
    pub approvers: Approvers,
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
    #[serde(default)]
    pub shared_with: Vec<ShareEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Business fields the workflow does not interpret (parties, value, dates...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub action: String,
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShareRole {
    #[default]
    Viewer,
    Editor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShareStatus {
    #[default]
    Pending,
    Accepted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareEntry {
    pub email: String,
    #[serde(default)]
    pub role: ShareRole,
    #[serde(default)]
    pub status: ShareStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_id: Option<String>,
}

impl Contract {
    /// New contracts always start at `requested`
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: ContractStatus::Requested,
            is_amended: false,
            amendment_stage: None,
            original_status: None,
            approvers: Approvers::default(),
            timeline: Vec::new(),
            shared_with: Vec::new(),
            owner_id: None,
            created_at: None,
            updated_at: None,
            extra: Map::new(),
        }
    }

    /// Current amendment stage when the contract is in amendment mode
    pub fn active_amendment_stage(&self) -> Option<AmendmentStage> {
        if self.is_amended && self.status == ContractStatus::Amendment {
            self.amendment_stage
        } else {
            None
        }
    }

    pub fn in_amendment(&self) -> bool {
        self.active_amendment_stage().is_some()
    }

    /// Check the amendment field invariants on a loaded document
    pub fn amendment_fields_consistent(&self) -> bool {
        let in_mode = self.is_amended && self.status == ContractStatus::Amendment;
        in_mode == self.amendment_stage.is_some() && in_mode == self.original_status.is_some()
    }

    pub fn push_event(
        &mut self,
        action: impl Into<String>,
        details: impl Into<String>,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) {
        self.timeline.push(TimelineEntry {
            action: action.into(),
            details: details.into(),
            actor: actor.map(str::to_string),
            timestamp: at,
        });
    }

    pub fn apply_patch(&mut self, patch: &ContractPatch, actor: Option<&str>, at: DateTime<Utc>) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(is_amended) = patch.is_amended {
            self.is_amended = is_amended;
        }
        patch.amendment_stage.apply_to(&mut self.amendment_stage);
        patch.original_status.apply_to(&mut self.original_status);
        for (key, value) in &patch.extra {
            self.extra.insert(key.clone(), value.clone());
        }
        for event in &patch.timeline {
            self.push_event(event.action.clone(), event.details.clone(), actor, at);
        }
        self.updated_at = Some(at);
    }

    /// Shallow document update covering the fields `patch` touched, read back
    /// from `self` after `apply_patch`. Cleared fields are written as null.
    pub fn document_update(&self, patch: &ContractPatch) -> Value {
        let mut update = Map::new();
        if patch.status.is_some() {
            update.insert("status".into(), Value::String(self.status.as_str().into()));
        }
        if patch.is_amended.is_some() {
            update.insert("isAmended".into(), Value::Bool(self.is_amended));
        }
        if !patch.amendment_stage.is_keep() {
            update.insert(
                "amendmentStage".into(),
                self.amendment_stage
                    .map(|s| Value::String(s.as_str().into()))
                    .unwrap_or(Value::Null),
            );
        }
        if !patch.original_status.is_keep() {
            update.insert(
                "originalStatus".into(),
                self.original_status
                    .map(|s| Value::String(s.as_str().into()))
                    .unwrap_or(Value::Null),
            );
        }
        for key in patch.extra.keys() {
            if let Some(value) = self.extra.get(key) {
                update.insert(key.clone(), value.clone());
            }
        }
        if !patch.timeline.is_empty() {
            update.insert(
                "timeline".into(),
                serde_json::to_value(&self.timeline).unwrap_or(Value::Array(Vec::new())),
            );
        }
        if let Some(at) = self.updated_at {
            update.insert("updatedAt".into(), Value::String(at.to_rfc3339()));
        }
        Value::Object(update)
    }
}
