// User notifications and the unread-count poller
//
// The poller is the only recurring background task: a fixed interval, no
// backoff, and any error reads as zero unread. Dropping the handle stops it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use uuid::Uuid;

use crate::store::{self, DocumentStore, StoreError, NOTIFICATIONS};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_id: Option<String>,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

pub async fn push_notification(
    store: &dyn DocumentStore,
    user_id: &str,
    message: &str,
    contract_id: Option<&str>,
) -> Result<Notification, StoreError> {
    let notification = Notification {
        id: Uuid::new_v4().simple().to_string(),
        user_id: user_id.to_string(),
        message: message.to_string(),
        contract_id: contract_id.map(str::to_string),
        read: false,
        created_at: Utc::now(),
    };
    store::put(store, NOTIFICATIONS, &notification.id, &notification).await?;
    Ok(notification)
}

pub async fn unread_count(store: &dyn DocumentStore, user_id: &str) -> Result<usize, StoreError> {
    let docs = store
        .query(NOTIFICATIONS, "userId", &Value::String(user_id.to_string()))
        .await?;
    Ok(docs
        .iter()
        .filter(|doc| !doc.get("read").and_then(Value::as_bool).unwrap_or(false))
        .count())
}

pub async fn mark_read(store: &dyn DocumentStore, notification_id: &str) -> Result<(), StoreError> {
    store
        .update(NOTIFICATIONS, notification_id, json!({ "read": true }))
        .await
}

/// Background refresh of one user's unread count
#[derive(Debug)]
pub struct UnreadCountPoller {
    handle: JoinHandle<()>,
    count: watch::Receiver<usize>,
}

impl UnreadCountPoller {
    /// Start polling; the first refresh happens immediately
    pub fn spawn(store: Arc<dyn DocumentStore>, user_id: String, period: Duration) -> Self {
        let (tx, count) = watch::channel(0);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let unread = match unread_count(store.as_ref(), &user_id).await {
                    Ok(n) => n,
                    Err(e) => {
                        debug!(user_id = %user_id, error = %e, "Unread count refresh failed");
                        0
                    }
                };
                tx.send_replace(unread);
            }
        });
        Self { handle, count }
    }

    /// Most recent count
    pub fn latest(&self) -> usize {
        *self.count.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.count.clone()
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for UnreadCountPoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
