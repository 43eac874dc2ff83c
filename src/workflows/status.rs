// Contract status taxonomy
//
// Flat enumeration of lifecycle states with an associated rank. The rank only
// answers "is this stage behind the current one" for progress display; it never
// decides whether a transition is legal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::WorkflowError;

/// Primary lifecycle position of a contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Requested,
    Draft,
    LegalReview,
    /// Legal returned the contract to the submitter
    LegalSendBack,
    /// Deprecated alias of `LegalSendBack`
    LegalDeclined,
    ManagementReview,
    /// Management returned the contract to the submitter
    ManagementSendBack,
    /// Deprecated alias of `ManagementSendBack`
    ManagementDeclined,
    WwfSigning,
    CounterpartySigning,
    Implementation,
    Amendment,
    ContractEnd,
    /// Legacy terminal state, kept readable for old documents
    Approval,
    /// Legacy terminal state, kept readable for old documents
    Finished,
}

impl ContractStatus {
    pub const ALL: [ContractStatus; 15] = [
        ContractStatus::Requested,
        ContractStatus::Draft,
        ContractStatus::LegalReview,
        ContractStatus::LegalSendBack,
        ContractStatus::LegalDeclined,
        ContractStatus::ManagementReview,
        ContractStatus::ManagementSendBack,
        ContractStatus::ManagementDeclined,
        ContractStatus::WwfSigning,
        ContractStatus::CounterpartySigning,
        ContractStatus::Implementation,
        ContractStatus::Amendment,
        ContractStatus::ContractEnd,
        ContractStatus::Approval,
        ContractStatus::Finished,
    ];

    /// Stages shown on the progress indicator, one per rank 0..=8
    pub const CANONICAL: [ContractStatus; 9] = [
        ContractStatus::Requested,
        ContractStatus::Draft,
        ContractStatus::LegalReview,
        ContractStatus::ManagementReview,
        ContractStatus::WwfSigning,
        ContractStatus::CounterpartySigning,
        ContractStatus::Implementation,
        ContractStatus::Amendment,
        ContractStatus::ContractEnd,
    ];

    /// Wire name as stored in contract documents
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Requested => "requested",
            ContractStatus::Draft => "draft",
            ContractStatus::LegalReview => "legal_review",
            ContractStatus::LegalSendBack => "legal_send_back",
            ContractStatus::LegalDeclined => "legal_declined",
            ContractStatus::ManagementReview => "management_review",
            ContractStatus::ManagementSendBack => "management_send_back",
            ContractStatus::ManagementDeclined => "management_declined",
            ContractStatus::WwfSigning => "wwf_signing",
            ContractStatus::CounterpartySigning => "counterparty_signing",
            ContractStatus::Implementation => "implementation",
            ContractStatus::Amendment => "amendment",
            ContractStatus::ContractEnd => "contract_end",
            ContractStatus::Approval => "approval",
            ContractStatus::Finished => "finished",
        }
    }

    /// Ordinal position; send-back and declined statuses share the rank of their review stage
    pub fn rank(&self) -> u8 {
        match self {
            ContractStatus::Requested => 0,
            ContractStatus::Draft => 1,
            ContractStatus::LegalReview
            | ContractStatus::LegalSendBack
            | ContractStatus::LegalDeclined => 2,
            ContractStatus::ManagementReview
            | ContractStatus::ManagementSendBack
            | ContractStatus::ManagementDeclined => 3,
            ContractStatus::WwfSigning => 4,
            ContractStatus::CounterpartySigning => 5,
            ContractStatus::Implementation => 6,
            ContractStatus::Amendment => 7,
            ContractStatus::ContractEnd => 8,
            ContractStatus::Approval => 9,
            ContractStatus::Finished => 10,
        }
    }

    /// Human readable label, e.g. `legal_review` -> `Legal Review`
    pub fn label(&self) -> String {
        humanize(self.as_str())
    }

    /// Statuses that no new code path should produce
    pub fn is_legacy(&self) -> bool {
        matches!(
            self,
            ContractStatus::Approval
                | ContractStatus::Finished
                | ContractStatus::LegalDeclined
                | ContractStatus::ManagementDeclined
        )
    }

    /// Rollback siblings of the review stages
    pub fn is_send_back(&self) -> bool {
        matches!(
            self,
            ContractStatus::LegalSendBack
                | ContractStatus::LegalDeclined
                | ContractStatus::ManagementSendBack
                | ContractStatus::ManagementDeclined
        )
    }

    /// The review stage a send-back status belongs to
    pub fn review_stage(&self) -> Option<ContractStatus> {
        match self {
            ContractStatus::LegalSendBack | ContractStatus::LegalDeclined => {
                Some(ContractStatus::LegalReview)
            }
            ContractStatus::ManagementSendBack | ContractStatus::ManagementDeclined => {
                Some(ContractStatus::ManagementReview)
            }
            _ => None,
        }
    }

    /// True when `self` sits strictly before `other` in rank
    pub fn is_behind(&self, other: ContractStatus) -> bool {
        self.rank() < other.rank()
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        ContractStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == needle)
            .ok_or_else(|| WorkflowError::UnknownStatus(s.to_string()))
    }
}

/// Convert an underscore separated token string to title case
pub fn humanize(raw: &str) -> String {
    raw.split('_')
        .filter(|token| !token.is_empty())
        .map(|token| {
            let mut chars = token.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip_through_from_str() {
        for status in ContractStatus::ALL {
            assert_eq!(status.as_str().parse::<ContractStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&ContractStatus::CounterpartySigning).unwrap();
        assert_eq!(json, "\"counterparty_signing\"");
        let parsed: ContractStatus = serde_json::from_str("\"management_send_back\"").unwrap();
        assert_eq!(parsed, ContractStatus::ManagementSendBack);
    }

    #[test]
    fn test_send_back_statuses_share_review_rank() {
        assert_eq!(ContractStatus::LegalSendBack.rank(), ContractStatus::LegalReview.rank());
        assert_eq!(ContractStatus::LegalDeclined.rank(), ContractStatus::LegalReview.rank());
        assert_eq!(
            ContractStatus::ManagementSendBack.rank(),
            ContractStatus::ManagementReview.rank()
        );
        assert_eq!(
            ContractStatus::ManagementDeclined.rank(),
            ContractStatus::ManagementReview.rank()
        );
        assert!(!ContractStatus::LegalReview.is_behind(ContractStatus::LegalSendBack));
    }

    #[test]
    fn test_canonical_stages_have_consecutive_ranks() {
        for (idx, status) in ContractStatus::CANONICAL.iter().enumerate() {
            assert_eq!(status.rank() as usize, idx);
        }
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let err = "archived".parse::<ContractStatus>().unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownStatus(ref s) if s == "archived"));
    }

    #[test]
    fn test_humanize_title_cases_tokens() {
        assert_eq!(humanize("legal_review"), "Legal Review");
        assert_eq!(humanize("wwf_signing"), "Wwf Signing");
        assert_eq!(humanize("implementation"), "Implementation");
        assert_eq!(ContractStatus::ContractEnd.label(), "Contract End");
    }

    #[test]
    fn test_legacy_flags() {
        assert!(ContractStatus::Approval.is_legacy());
        assert!(ContractStatus::LegalDeclined.is_legacy());
        assert!(!ContractStatus::LegalSendBack.is_legacy());
        assert_eq!(
            ContractStatus::ManagementDeclined.review_stage(),
            Some(ContractStatus::ManagementReview)
        );
    }
}
