// Progress indicator markers derived from a contract status

use serde::Serialize;

use super::ContractStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMarker {
    pub stage: ContractStatus,
    pub label: String,
    pub completed: bool,
    pub current: bool,
    pub sent_back: bool,
}

/// One marker per canonical stage, in rank order
pub fn progress(status: ContractStatus) -> Vec<ProgressMarker> {
    let rank = status.rank();
    ContractStatus::CANONICAL
        .iter()
        .map(|&stage| ProgressMarker {
            stage,
            label: stage.label(),
            completed: stage.rank() < rank,
            current: stage.rank() == rank,
            sent_back: status.review_stage() == Some(stage),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_current_marker() {
        let markers = progress(ContractStatus::WwfSigning);
        assert_eq!(markers.len(), 9);
        assert_eq!(markers.iter().filter(|m| m.current).count(), 1);
        assert!(markers[4].current);
        assert!(markers[..4].iter().all(|m| m.completed));
        assert!(markers[5..].iter().all(|m| !m.completed));
    }

    #[test]
    fn test_send_back_marks_review_stage() {
        let markers = progress(ContractStatus::ManagementSendBack);
        let review = &markers[3];
        assert!(review.current && review.sent_back);
        assert!(!markers[2].sent_back);
        assert!(!markers[4].completed);
    }

    #[test]
    fn test_legacy_terminal_completes_everything() {
        let markers = progress(ContractStatus::Finished);
        assert!(markers.iter().all(|m| m.completed && !m.current));
    }
}
