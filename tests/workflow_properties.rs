//! Property tests for the contract workflow core
//!
//! Approver maps are generated with proptest: list lengths and the
//! approved/declined flags of every record vary freely. The status and stage
//! spaces are small and closed, so those rules are swept exhaustively.

use contractflow::workflows::amendment::AMENDMENT_COMPLETED;
use contractflow::workflows::{
    evaluate_approvals, progress, transition, transition_str, AmendmentStage, ApprovalRecord,
    ApproverCategory, Approvers, ContractPatch, ContractStatus, FieldUpdate, MissingApproval,
    Rejection, RequestedState, TransitionOutcome,
};
use contractflow::Contract;
use proptest::prelude::*;
use proptest::sample::Index;
use proptest_derive::Arbitrary;
use serde_json::json;

fn record(approved: bool, declined: bool) -> ApprovalRecord {
    ApprovalRecord {
        approved,
        declined,
        ..Default::default()
    }
}

fn contract_at(status: ContractStatus) -> Contract {
    let mut contract = Contract::new("c-1", "Supply agreement");
    contract.status = status;
    contract
}

fn amended(original: ContractStatus, stage: AmendmentStage) -> Contract {
    let mut contract = contract_at(ContractStatus::Amendment);
    contract.is_amended = true;
    contract.amendment_stage = Some(stage);
    contract.original_status = Some(original);
    contract
}

fn accepted(outcome: TransitionOutcome) -> ContractPatch {
    match outcome {
        TransitionOutcome::Accepted(patch) => patch,
        TransitionOutcome::Rejected(rejection) => panic!("unexpected rejection: {rejection}"),
    }
}

fn apply(contract: &mut Contract, outcome: TransitionOutcome) {
    let patch = accepted(outcome);
    contract.apply_patch(&patch, Some("tester"), chrono::Utc::now());
}

// (approved, declined) flags for each record of one category
#[derive(Debug, Clone, Arbitrary)]
struct CategoryDecisions {
    #[proptest(strategy = "prop::collection::vec(any::<(bool, bool)>(), 0..6)")]
    flags: Vec<(bool, bool)>,
}

impl CategoryDecisions {
    fn records(&self) -> Vec<ApprovalRecord> {
        self.flags.iter().map(|&(a, d)| record(a, d)).collect()
    }
}

#[derive(Debug, Clone, Arbitrary)]
struct ApproverMap {
    legal: CategoryDecisions,
    management: CategoryDecisions,
    approver: CategoryDecisions,
}

impl ApproverMap {
    fn approvers(&self) -> Approvers {
        Approvers::new()
            .with(ApproverCategory::Legal, self.legal.records())
            .with(ApproverCategory::Management, self.management.records())
            .with(ApproverCategory::Approver, self.approver.records())
    }

    fn category_mut(&mut self, category: ApproverCategory) -> &mut CategoryDecisions {
        match category {
            ApproverCategory::Legal => &mut self.legal,
            ApproverCategory::Management => &mut self.management,
            ApproverCategory::Approver => &mut self.approver,
        }
    }
}

fn approved_list() -> impl Strategy<Value = Vec<ApprovalRecord>> {
    prop::collection::vec(Just(record(true, false)), 1..8)
}

fn category_strategy() -> impl Strategy<Value = ApproverCategory> {
    prop_oneof![
        Just(ApproverCategory::Legal),
        Just(ApproverCategory::Management),
        Just(ApproverCategory::Approver),
    ]
}

fn gated_category_strategy() -> impl Strategy<Value = ApproverCategory> {
    prop_oneof![Just(ApproverCategory::Legal), Just(ApproverCategory::Management)]
}

proptest! {
    #[test]
    fn prop_fully_approved_maps_are_allowed(
        legal in approved_list(),
        management in approved_list(),
        approver in prop::option::of(approved_list()),
    ) {
        let mut approvers = Approvers::new()
            .with(ApproverCategory::Legal, legal)
            .with(ApproverCategory::Management, management);
        if let Some(records) = approver {
            approvers.set(ApproverCategory::Approver, records);
        }
        let verdict = evaluate_approvals(&approvers);
        prop_assert!(verdict.allowed(), "refused: {:?}", verdict.reason());
    }

    #[test]
    fn prop_missing_gated_category_is_not_assigned(
        map in any::<ApproverMap>(),
        missing in gated_category_strategy(),
    ) {
        let mut map = map;
        map.category_mut(missing).flags.clear();
        let verdict = evaluate_approvals(&map.approvers());
        prop_assert!(!verdict.allowed());
        prop_assert!(verdict.missing.contains(&MissingApproval::NotAssigned(missing)));
        let expected = format!("{} approver is not assigned", missing.label());
        prop_assert!(verdict.reason().unwrap_or_default().contains(&expected));
    }

    #[test]
    fn prop_any_single_decline_blocks(
        map in any::<ApproverMap>(),
        declining in category_strategy(),
        position in any::<Index>(),
    ) {
        let mut map = map;
        let decisions = map.category_mut(declining);
        if decisions.flags.is_empty() {
            decisions.flags.push((true, false));
        }
        let at = position.index(decisions.flags.len());
        decisions.flags[at] = (false, true);

        let verdict = evaluate_approvals(&map.approvers());
        prop_assert!(!verdict.allowed());
        prop_assert!(verdict.missing.contains(&MissingApproval::Declined(declining)));
    }

    #[test]
    fn prop_gate_matches_folded_categories(map in any::<ApproverMap>()) {
        let signed_off = |d: &CategoryDecisions| {
            !d.flags.is_empty() && d.flags.iter().all(|&(a, decl)| a && !decl)
        };
        let any_decline = map.approver.flags.iter().any(|&(_, decl)| decl);
        let expected = signed_off(&map.legal) && signed_off(&map.management) && !any_decline;
        prop_assert_eq!(evaluate_approvals(&map.approvers()).allowed(), expected);
    }
}

#[test]
fn test_entering_amendment_snapshots_every_status() {
    for status in ContractStatus::ALL {
        if status == ContractStatus::Amendment {
            continue;
        }
        let patch = accepted(transition(
            &contract_at(status),
            ContractStatus::Amendment.into(),
            None,
        ));
        assert_eq!(patch.status, Some(ContractStatus::Amendment));
        assert_eq!(patch.is_amended, Some(true));
        assert_eq!(patch.amendment_stage, FieldUpdate::Set(AmendmentStage::Amendment));
        assert_eq!(patch.original_status, FieldUpdate::Set(status));
    }
}

#[test]
fn test_stage_changes_from_legal() {
    let contract = amended(ContractStatus::Implementation, AmendmentStage::Legal);

    let forward = accepted(transition(&contract, AmendmentStage::Wwf.into(), None));
    assert_eq!(forward.amendment_stage, FieldUpdate::Set(AmendmentStage::Wwf));
    assert_eq!(forward.status, None);

    let back = accepted(transition(&contract, AmendmentStage::Amendment.into(), None));
    assert_eq!(back.amendment_stage, FieldUpdate::Set(AmendmentStage::Amendment));

    let skip = transition(&contract, AmendmentStage::Counterparty.into(), None);
    assert!(matches!(
        skip,
        TransitionOutcome::Rejected(Rejection::StageSkip {
            from: AmendmentStage::Legal,
            to: AmendmentStage::Counterparty
        })
    ));

    let same = accepted(transition(&contract, AmendmentStage::Legal.into(), None));
    assert!(same.is_empty());
}

#[test]
fn test_stage_window_is_adjacent_only() {
    for current in AmendmentStage::ALL {
        for requested in AmendmentStage::ALL {
            let contract = amended(ContractStatus::Draft, current);
            let outcome = transition(&contract, requested.into(), None);
            let distance = current.index().abs_diff(requested.index());
            assert_eq!(outcome.is_accepted(), distance <= 1, "{current} -> {requested}");
        }
    }
}

#[test]
fn test_premature_exit_always_mentions_completion() {
    for stage in [
        AmendmentStage::Amendment,
        AmendmentStage::Legal,
        AmendmentStage::Wwf,
    ] {
        for target in ContractStatus::ALL {
            if target == ContractStatus::Amendment {
                continue;
            }
            let contract = amended(ContractStatus::Implementation, stage);
            let outcome = transition(&contract, target.into(), None);
            let reason = outcome.reason().unwrap_or_default();
            assert!(
                reason.contains("must be completed"),
                "{stage} -> {target}: {reason}"
            );
        }
    }
}

#[test]
fn test_exit_at_counterparty_restores_original() {
    let contract = amended(ContractStatus::Implementation, AmendmentStage::Counterparty);
    let patch = accepted(transition(&contract, ContractStatus::Implementation.into(), None));

    assert_eq!(patch.status, Some(ContractStatus::Implementation));
    assert_eq!(patch.is_amended, Some(false));
    assert_eq!(patch.amendment_stage, FieldUpdate::Clear);
    assert_eq!(patch.original_status, FieldUpdate::Clear);
    assert!(patch.has_event(AMENDMENT_COMPLETED));
    assert!(patch
        .timeline
        .iter()
        .any(|e| e.details.contains("Implementation")));

    let mut after = contract.clone();
    after.apply_patch(&patch, None, chrono::Utc::now());
    let doc = after.document_update(&patch);
    assert_eq!(doc["amendmentStage"], json!(null));
    assert_eq!(doc["originalStatus"], json!(null));
    assert_eq!(doc["isAmended"], json!(false));
}

#[test]
fn test_enter_then_exit_round_trips_every_status() {
    for original in ContractStatus::ALL {
        if original == ContractStatus::Amendment {
            continue;
        }
        let mut contract = contract_at(original);
        // Returning to the legacy `approval` status re-runs the approval gate
        contract.approvers = Approvers::new()
            .with(ApproverCategory::Legal, vec![record(true, false)])
            .with(ApproverCategory::Management, vec![record(true, false)]);
        let outcome = transition(&contract, ContractStatus::Amendment.into(), None);
        apply(&mut contract, outcome);
        assert!(contract.in_amendment());
        assert!(contract.amendment_fields_consistent());

        // Force the stage to counterparty, one adjacent step at a time
        for stage in [
            AmendmentStage::Legal,
            AmendmentStage::Wwf,
            AmendmentStage::Counterparty,
        ] {
            let outcome = transition(&contract, stage.into(), None);
            apply(&mut contract, outcome);
        }

        let outcome = transition(&contract, original.into(), None);
        apply(&mut contract, outcome);
        assert_eq!(contract.status, original);
        assert!(!contract.is_amended);
        assert_eq!(contract.amendment_stage, None);
        assert_eq!(contract.original_status, None);
        assert!(contract.amendment_fields_consistent());
    }
}

#[test]
fn test_approval_rejected_when_management_pending() {
    let mut contract = contract_at(ContractStatus::LegalReview);
    contract.approvers = serde_json::from_value(json!({
        "legal": { "approved": true, "declined": false },
        "management": { "approved": false, "declined": false }
    }))
    .unwrap();

    let outcome = transition_str(&contract, "approval", None).unwrap();
    assert!(!outcome.is_accepted());
    let reason = outcome.reason().unwrap();
    assert!(reason.contains("Management"), "{reason}");
    assert!(!reason.contains("Legal"), "{reason}");
}

#[test]
fn test_amendment_from_implementation_without_approvers() {
    let contract = contract_at(ContractStatus::Implementation);
    assert!(contract.approvers.is_empty());

    let patch = accepted(transition_str(&contract, "amendment", None).unwrap());
    assert_eq!(patch.amendment_stage, FieldUpdate::Set(AmendmentStage::Amendment));
    assert_eq!(
        patch.original_status,
        FieldUpdate::Set(ContractStatus::Implementation)
    );
}

#[test]
fn test_stage_names_outside_amendment_are_rejected() {
    let contract = contract_at(ContractStatus::Draft);
    for stage in ["legal", "wwf", "counterparty"] {
        let outcome = transition_str(&contract, stage, None).unwrap();
        assert!(matches!(
            outcome,
            TransitionOutcome::Rejected(Rejection::NotInAmendment { .. })
        ));
    }
    assert!(transition_str(&contract, "signed", None).is_err());
}

#[test]
fn test_plain_status_change_merges_extra_but_not_reserved() {
    let contract = contract_at(ContractStatus::Draft);
    let extra = json!({ "reviewer": "ana@example.com", "status": "contract_end" });
    let patch = accepted(transition(
        &contract,
        RequestedState::Status(ContractStatus::LegalReview),
        extra.as_object().cloned(),
    ));
    assert_eq!(patch.status, Some(ContractStatus::LegalReview));
    assert_eq!(patch.extra.get("reviewer"), Some(&json!("ana@example.com")));
    assert!(!patch.extra.contains_key("status"));
}

#[test]
fn test_send_back_never_advances_progress() {
    let markers = progress(ContractStatus::ManagementSendBack);
    let review = markers
        .iter()
        .find(|m| m.stage == ContractStatus::ManagementReview)
        .unwrap();
    assert!(review.current && review.sent_back);
    assert!(markers
        .iter()
        .filter(|m| m.completed)
        .all(|m| m.stage.rank() < ContractStatus::ManagementReview.rank()));
}
