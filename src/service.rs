// Contract service: runs the workflow against the document store
//
// Each operation loads the contract, decides with the pure workflow functions
// and writes the resulting patch back with a single per-document update.
// Approver updates and the status updates they enable are separate,
// sequential store calls.

use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::contract::{Contract, RESERVED_FIELDS};
use crate::identity::Actor;
use crate::store::{self, DocumentStore, StoreError, CONTRACTS};
use crate::telemetry::{create_contract_span, generate_correlation_id};
use crate::workflows::{
    amendment, transition, AmendmentStage, ApprovalRecord, ApproverCategory, Approvers,
    ContractPatch, ContractStatus, RequestedState, TransitionOutcome, WorkflowError,
};

pub const CONTRACT_CREATED: &str = "Contract Created";
pub const APPROVERS_UPDATED: &str = "Approvers Updated";
pub const APPROVAL_GRANTED: &str = "Approval Granted";
pub const APPROVAL_DECLINED: &str = "Approval Declined";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Contract {0} not found")]
    ContractNotFound(String),

    #[error("No {category} approver with email {email} on contract {contract_id}")]
    ApproverNotFound {
        contract_id: String,
        category: ApproverCategory,
        email: String,
    },

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Decline,
}

#[derive(Clone)]
pub struct ContractService {
    store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for ContractService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractService").finish_non_exhaustive()
    }
}

impl ContractService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Create a contract; the status is always `requested` regardless of `fields`
    pub async fn create_contract(
        &self,
        actor: &Actor,
        title: &str,
        fields: Map<String, Value>,
    ) -> Result<Contract, ServiceError> {
        let now = Utc::now();
        let mut contract = Contract::new(Uuid::new_v4().simple().to_string(), title);
        contract.owner_id = Some(actor.id.clone());
        contract.created_at = Some(now);
        contract.updated_at = Some(now);
        contract.extra = fields
            .into_iter()
            .filter(|(key, _)| !RESERVED_FIELDS.contains(&key.as_str()))
            .collect();
        contract.push_event(
            CONTRACT_CREATED,
            format!("Contract \"{title}\" requested"),
            Some(&actor.id),
            now,
        );

        store::put(self.store.as_ref(), CONTRACTS, &contract.id, &contract).await?;
        info!(contract_id = %contract.id, actor = %actor.id, "Contract created");
        Ok(contract)
    }

    pub async fn get_contract(&self, id: &str) -> Result<Contract, ServiceError> {
        store::fetch(self.store.as_ref(), CONTRACTS, id)
            .await?
            .ok_or_else(|| ServiceError::ContractNotFound(id.to_string()))
    }

    pub async fn contracts_with_status(
        &self,
        status: ContractStatus,
    ) -> Result<Vec<Contract>, ServiceError> {
        Ok(store::query_as(
            self.store.as_ref(),
            CONTRACTS,
            "status",
            &Value::String(status.as_str().to_string()),
        )
        .await?)
    }

    /// Decide and apply a transition. Rejections come back as
    /// `TransitionOutcome::Rejected` with nothing written.
    pub async fn request_transition(
        &self,
        actor: &Actor,
        id: &str,
        requested: RequestedState,
        extra: Option<Map<String, Value>>,
    ) -> Result<TransitionOutcome, ServiceError> {
        let correlation_id = generate_correlation_id();
        let span = create_contract_span(
            "transition",
            Some(id),
            Some(&actor.id),
            Some(&correlation_id),
        );

        async move {
            let mut contract = self.get_contract(id).await?;
            let from = contract.status;
            let outcome = transition(&contract, requested, extra);

            match &outcome {
                TransitionOutcome::Accepted(patch) => {
                    self.write_patch(&mut contract, patch, actor).await?;
                    info!(
                        from = %from,
                        to = %contract.status,
                        amendment_stage = ?contract.amendment_stage,
                        "Transition applied"
                    );
                }
                TransitionOutcome::Rejected(rejection) => {
                    info!(
                        from = %from,
                        requested = ?requested,
                        reason = %rejection,
                        "Transition rejected"
                    );
                }
            }
            Ok::<_, ServiceError>(outcome)
        }
        .instrument(span)
        .await
    }

    /// Parse a wire status or stage name and request the transition
    pub async fn request_transition_str(
        &self,
        actor: &Actor,
        id: &str,
        requested: &str,
        extra: Option<Map<String, Value>>,
    ) -> Result<TransitionOutcome, ServiceError> {
        let requested = requested.parse::<RequestedState>()?;
        self.request_transition(actor, id, requested, extra).await
    }

    /// Replace one approver category, then let the amendment auto-progress
    pub async fn set_approvers(
        &self,
        actor: &Actor,
        id: &str,
        category: ApproverCategory,
        records: Vec<ApprovalRecord>,
    ) -> Result<Contract, ServiceError> {
        let mut contract = self.get_contract(id).await?;
        let before = contract.approvers.clone();
        let count = records.len();
        contract.approvers.set(category, records);
        let now = Utc::now();
        contract.push_event(
            APPROVERS_UPDATED,
            format!("{} approvers set ({count})", category.label()),
            Some(&actor.id),
            now,
        );
        self.write_approvers(&mut contract, now).await?;
        info!(contract_id = %id, category = %category, count, "Approvers updated");

        self.auto_progress_amendment(actor, id, &before).await?;
        self.get_contract(id).await
    }

    /// Record one approver's decision, then let the amendment auto-progress
    pub async fn record_decision(
        &self,
        actor: &Actor,
        id: &str,
        category: ApproverCategory,
        approver_email: &str,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<Contract, ServiceError> {
        let mut contract = self.get_contract(id).await?;
        let before = contract.approvers.clone();
        let now = Utc::now();
        let record = contract
            .approvers
            .get_mut(category)
            .and_then(|records| {
                records.iter_mut().find(|r| {
                    r.email
                        .as_deref()
                        .is_some_and(|e| e.eq_ignore_ascii_case(approver_email))
                })
            })
            .ok_or_else(|| ServiceError::ApproverNotFound {
                contract_id: id.to_string(),
                category,
                email: approver_email.to_string(),
            })?;

        let action = match decision {
            Decision::Approve => {
                record.approve(now, comment);
                APPROVAL_GRANTED
            }
            Decision::Decline => {
                record.decline(now, comment);
                APPROVAL_DECLINED
            }
        };
        contract.push_event(
            action,
            format!("{} ({})", approver_email, category.label()),
            Some(&actor.id),
            now,
        );
        self.write_approvers(&mut contract, now).await?;
        info!(
            contract_id = %id,
            category = %category,
            decision = ?decision,
            "Approval decision recorded"
        );

        self.auto_progress_amendment(actor, id, &before).await?;
        self.get_contract(id).await
    }

    /// Advance the amendment stage by one when the update that replaced
    /// `before` completed the legal and management sign-offs. Returns the new
    /// stage, or `None` when nothing moved.
    pub async fn auto_progress_amendment(
        &self,
        actor: &Actor,
        id: &str,
        before: &Approvers,
    ) -> Result<Option<AmendmentStage>, ServiceError> {
        let mut contract = self.get_contract(id).await?;
        let Some(current) = contract.active_amendment_stage() else {
            return Ok(None);
        };
        let Some(next) = amendment::auto_advance(current, before, &contract.approvers) else {
            return Ok(None);
        };
        // Adjacent by construction, so this cannot be refused
        let Ok(patch) = amendment::change_stage(current, next) else {
            return Ok(None);
        };
        self.write_patch(&mut contract, &patch, actor).await?;
        info!(contract_id = %id, from = %current, to = %next, "Amendment stage auto-advanced");
        Ok(Some(next))
    }

    async fn write_patch(
        &self,
        contract: &mut Contract,
        patch: &ContractPatch,
        actor: &Actor,
    ) -> Result<(), ServiceError> {
        if patch.is_empty() {
            return Ok(());
        }
        contract.apply_patch(patch, Some(&actor.id), Utc::now());
        self.store
            .update(CONTRACTS, &contract.id, contract.document_update(patch))
            .await?;
        Ok(())
    }

    async fn write_approvers(
        &self,
        contract: &mut Contract,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        contract.updated_at = Some(now);
        let update = json!({
            "approvers": serde_json::to_value(&contract.approvers).map_err(StoreError::from)?,
            "timeline": serde_json::to_value(&contract.timeline).map_err(StoreError::from)?,
            "updatedAt": now.to_rfc3339(),
        });
        self.store.update(CONTRACTS, &contract.id, update).await?;
        Ok(())
    }
}
