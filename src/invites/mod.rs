// Share invites: creation, email delivery and acceptance

pub mod email;
pub mod mailer;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::contract::{Contract, ShareEntry, ShareRole, ShareStatus};
use crate::identity::Actor;
use crate::notifications;
use crate::store::{self, DocumentStore, StoreError, CONTRACTS, INVITES};

pub use email::{accept_url, render_invitation, InvitationEmail};
pub use mailer::{mailer_from_config, HttpMailer, LogMailer, MailError, Mailer};

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    pub id: String,
    pub contract_id: String,
    pub contract_title: String,
    pub email: String,
    pub inviter_id: String,
    pub inviter_name: String,
    #[serde(default)]
    pub role: ShareRole,
    #[serde(default)]
    pub accepted: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum InviteError {
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Contract {0} not found")]
    ContractNotFound(String),

    #[error("Invite {0} not found")]
    InviteNotFound(String),

    #[error("Invite {0} has already been accepted")]
    AlreadyAccepted(String),

    #[error("Failed to send the invitation email")]
    Delivery(#[source] MailError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email.trim())
}

#[derive(Clone)]
pub struct InviteService {
    store: Arc<dyn DocumentStore>,
    mailer: Arc<dyn Mailer>,
    public_url: String,
}

impl std::fmt::Debug for InviteService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InviteService")
            .field("public_url", &self.public_url)
            .finish_non_exhaustive()
    }
}

impl InviteService {
    /// `public_url` is the externally reachable base of the accept-invite endpoint
    pub fn new(
        store: Arc<dyn DocumentStore>,
        mailer: Arc<dyn Mailer>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            mailer,
            public_url: public_url.into(),
        }
    }

    /// Record a pending share and email the invitation. The invite and share
    /// entry stay pending if delivery fails.
    pub async fn send_invite(
        &self,
        actor: &Actor,
        contract_id: &str,
        email: &str,
        role: ShareRole,
    ) -> Result<Invite, InviteError> {
        let email = email.trim();
        if !is_valid_email(email) {
            return Err(InviteError::InvalidEmail(email.to_string()));
        }
        let mut contract = self.load_contract(contract_id).await?;

        let now = Utc::now();
        let invite = Invite {
            id: Uuid::new_v4().simple().to_string(),
            contract_id: contract.id.clone(),
            contract_title: contract.title.clone(),
            email: email.to_string(),
            inviter_id: actor.id.clone(),
            inviter_name: actor.name().to_string(),
            role,
            accepted: false,
            created_at: now,
            accepted_at: None,
        };
        store::put(self.store.as_ref(), INVITES, &invite.id, &invite).await?;

        let entry = ShareEntry {
            email: email.to_string(),
            role,
            status: ShareStatus::Pending,
            invite_id: Some(invite.id.clone()),
        };
        match contract
            .shared_with
            .iter_mut()
            .find(|e| e.email.eq_ignore_ascii_case(email))
        {
            Some(existing) => *existing = entry,
            None => contract.shared_with.push(entry),
        }
        self.write_shares(&contract, now).await?;

        let message = render_invitation(
            email,
            &accept_url(&self.public_url, &invite.id),
            actor.name(),
            &contract.title,
        );
        if let Err(e) = self.mailer.send(&message).await {
            warn!(invite_id = %invite.id, error = %e, "Invitation delivery failed");
            return Err(InviteError::Delivery(e));
        }

        info!(invite_id = %invite.id, contract_id = %contract.id, "Invite sent");
        Ok(invite)
    }

    /// Mark the invite accepted and flip the contract's share entry
    pub async fn accept_invite(&self, invite_id: &str) -> Result<Invite, InviteError> {
        let mut invite: Invite = store::fetch(self.store.as_ref(), INVITES, invite_id)
            .await
            .map_err(|e| match e {
                StoreError::InvalidId(_) => InviteError::InviteNotFound(invite_id.to_string()),
                other => InviteError::Store(other),
            })?
            .ok_or_else(|| InviteError::InviteNotFound(invite_id.to_string()))?;
        if invite.accepted {
            return Err(InviteError::AlreadyAccepted(invite_id.to_string()));
        }

        // The invite stays usable until the contract it points at is known to exist
        let mut contract = self.load_contract(&invite.contract_id).await?;

        let now = Utc::now();
        self.store
            .update(
                INVITES,
                invite_id,
                json!({ "accepted": true, "acceptedAt": now.to_rfc3339() }),
            )
            .await?;
        invite.accepted = true;
        invite.accepted_at = Some(now);

        let position = contract
            .shared_with
            .iter()
            .position(|e| e.invite_id.as_deref() == Some(invite_id))
            .or_else(|| {
                contract
                    .shared_with
                    .iter()
                    .position(|e| e.email.eq_ignore_ascii_case(&invite.email))
            });
        match position {
            Some(idx) => {
                let entry = &mut contract.shared_with[idx];
                entry.status = ShareStatus::Accepted;
                entry.invite_id = Some(invite.id.clone());
            }
            None => contract.shared_with.push(ShareEntry {
                email: invite.email.clone(),
                role: invite.role,
                status: ShareStatus::Accepted,
                invite_id: Some(invite.id.clone()),
            }),
        }
        self.write_shares(&contract, now).await?;

        if let Some(owner) = &contract.owner_id {
            let message = format!(
                "{} accepted the invitation to \"{}\"",
                invite.email, contract.title
            );
            let pushed = notifications::push_notification(
                self.store.as_ref(),
                owner,
                &message,
                Some(&contract.id),
            )
            .await;
            if let Err(e) = pushed {
                warn!(error = %e, "Failed to notify contract owner");
            }
        }

        info!(invite_id = %invite_id, contract_id = %contract.id, "Invite accepted");
        Ok(invite)
    }

    async fn load_contract(&self, id: &str) -> Result<Contract, InviteError> {
        store::fetch(self.store.as_ref(), CONTRACTS, id)
            .await?
            .ok_or_else(|| InviteError::ContractNotFound(id.to_string()))
    }

    async fn write_shares(
        &self,
        contract: &Contract,
        now: DateTime<Utc>,
    ) -> Result<(), InviteError> {
        let update = json!({
            "sharedWith": serde_json::to_value(&contract.shared_with).map_err(StoreError::from)?,
            "updatedAt": now.to_rfc3339(),
        });
        self.store.update(CONTRACTS, &contract.id, update).await?;
        Ok(())
    }
}
