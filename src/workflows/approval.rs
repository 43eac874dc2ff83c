// Approval gate over the contract's approvers map

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Named group whose approval or decline is tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApproverCategory {
    Legal,
    Management,
    Approver,
}

impl ApproverCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApproverCategory::Legal => "legal",
            ApproverCategory::Management => "management",
            ApproverCategory::Approver => "approver",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ApproverCategory::Legal => "Legal",
            ApproverCategory::Management => "Management",
            ApproverCategory::Approver => "Approver",
        }
    }
}

impl fmt::Display for ApproverCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApproverCategory {
    type Err = super::WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legal" => Ok(ApproverCategory::Legal),
            "management" => Ok(ApproverCategory::Management),
            "approver" => Ok(ApproverCategory::Approver),
            other => Err(super::WorkflowError::UnknownApproverCategory(other.to_string())),
        }
    }
}

/// One approver's decision
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRecord {
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub declined: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declined_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ApprovalRecord {
    /// A pending record assigned to `email`
    pub fn pending(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Default::default()
        }
    }

    pub fn approve(&mut self, at: DateTime<Utc>, comment: Option<String>) {
        self.approved = true;
        self.declined = false;
        self.approved_at = Some(at);
        self.declined_at = None;
        self.comment = comment;
    }

    pub fn decline(&mut self, at: DateTime<Utc>, comment: Option<String>) {
        self.approved = false;
        self.declined = true;
        self.declined_at = Some(at);
        self.approved_at = None;
        self.comment = comment;
    }
}

/// Category -> ordered records. A category stored as a single record on the
/// wire decodes to a one element list; encoding always writes lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Approvers(BTreeMap<ApproverCategory, Vec<ApprovalRecord>>);

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<ApprovalRecord>),
    One(ApprovalRecord),
}

impl<'de> Deserialize<'de> for Approvers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: BTreeMap<ApproverCategory, Option<OneOrMany>> =
            Option::deserialize(deserializer)?.unwrap_or_default();
        let map = raw
            .into_iter()
            .filter_map(|(category, entry)| {
                let records = match entry? {
                    OneOrMany::Many(records) => records,
                    OneOrMany::One(record) => vec![record],
                };
                Some((category, records))
            })
            .collect();
        Ok(Approvers(map))
    }
}

impl Approvers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, category: ApproverCategory, records: Vec<ApprovalRecord>) -> Self {
        self.set(category, records);
        self
    }

    /// Records for a category; empty when the category is absent
    pub fn get(&self, category: ApproverCategory) -> &[ApprovalRecord] {
        self.0.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get_mut(&mut self, category: ApproverCategory) -> Option<&mut Vec<ApprovalRecord>> {
        self.0.get_mut(&category)
    }

    pub fn set(&mut self, category: ApproverCategory, records: Vec<ApprovalRecord>) {
        if records.is_empty() {
            self.0.remove(&category);
        } else {
            self.0.insert(category, records);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ApproverCategory, &[ApprovalRecord])> {
        self.0.iter().map(|(category, records)| (*category, records.as_slice()))
    }

    pub fn standing(&self, category: ApproverCategory) -> CategoryStanding {
        CategoryStanding::of(self.get(category))
    }
}

/// Folded view of one category: approved is AND over records, declined is OR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryStanding {
    pub assigned: bool,
    pub approved: bool,
    pub declined: bool,
}

impl CategoryStanding {
    pub fn of(records: &[ApprovalRecord]) -> Self {
        let assigned = !records.is_empty();
        Self {
            assigned,
            approved: assigned && records.iter().all(|r| r.approved),
            declined: records.iter().any(|r| r.declined),
        }
    }
}

/// Why a category blocks the move to approval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingApproval {
    NotAssigned(ApproverCategory),
    Declined(ApproverCategory),
    NotApproved(ApproverCategory),
}

impl MissingApproval {
    pub fn category(&self) -> ApproverCategory {
        match self {
            MissingApproval::NotAssigned(c)
            | MissingApproval::Declined(c)
            | MissingApproval::NotApproved(c) => *c,
        }
    }
}

impl fmt::Display for MissingApproval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingApproval::NotAssigned(c) => write!(f, "{} approver is not assigned", c.label()),
            MissingApproval::Declined(c) => write!(f, "{} has declined", c.label()),
            MissingApproval::NotApproved(c) => write!(f, "{} approval is missing", c.label()),
        }
    }
}

/// Categories that must sign off before a contract may enter `approval`
pub const GATED_CATEGORIES: [ApproverCategory; 2] =
    [ApproverCategory::Legal, ApproverCategory::Management];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApprovalVerdict {
    pub missing: Vec<MissingApproval>,
}

impl ApprovalVerdict {
    pub fn allowed(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn blocks(&self, category: ApproverCategory) -> bool {
        self.missing.iter().any(|m| m.category() == category)
    }

    /// User facing reason, `None` when allowed
    pub fn reason(&self) -> Option<String> {
        if self.allowed() {
            return None;
        }
        let items: Vec<String> = self.missing.iter().map(ToString::to_string).collect();
        Some(format!("Cannot move to approval: {}", items.join("; ")))
    }
}

/// Decide whether the approvers map permits a move to `approval`.
///
/// Legal and management must be assigned and fully approved. A decline in any
/// category blocks, including the ungated `approver` category.
pub fn evaluate(approvers: &Approvers) -> ApprovalVerdict {
    let mut missing: Vec<MissingApproval> = GATED_CATEGORIES
        .iter()
        .filter_map(|&category| {
            let standing = approvers.standing(category);
            if !standing.assigned {
                Some(MissingApproval::NotAssigned(category))
            } else if standing.declined {
                Some(MissingApproval::Declined(category))
            } else if !standing.approved {
                Some(MissingApproval::NotApproved(category))
            } else {
                None
            }
        })
        .collect();
    if approvers.standing(ApproverCategory::Approver).declined {
        missing.push(MissingApproval::Declined(ApproverCategory::Approver));
    }
    ApprovalVerdict { missing }
}
