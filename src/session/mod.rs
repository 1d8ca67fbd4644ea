//! Confirmation sessions
//!
//! A suspended transaction is parked here between the question going out and
//! the user's answer coming back. Only the storage contract is fixed; the
//! in-memory store is the default backend and the one used in tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::executor::ConfirmPending;
use crate::plan::Plan;
use crate::snapshot::Snapshot;

/// Sessions expire five minutes after creation.
pub const SESSION_TTL: Duration = Duration::from_secs(300);

/// Everything needed to resume a suspended transaction later.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmSession {
    pub id: String,
    pub pending: ConfirmPending,
    /// The original user instruction, kept for logging and summaries.
    pub instruction: String,
    /// Snapshot as it was when the plan was bound.
    pub snapshot: Snapshot,
    pub plan: Plan,
    pub created_at: DateTime<Utc>,
}

impl ConfirmSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        (now - self.created_at).to_std().is_ok_and(|age| age > SESSION_TTL)
    }
}

/// Storage contract for pending confirmations.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Park a suspended transaction; returns the generated session id.
    async fn create_confirm_session(
        &self,
        pending: ConfirmPending,
        instruction: String,
        snapshot: Snapshot,
        plan: Plan,
    ) -> Result<String>;

    /// Fetch a session. `None` means unknown or expired.
    async fn get_confirm_session(&self, id: &str) -> Result<Option<ConfirmSession>>;

    async fn delete_confirm_session(&self, id: &str) -> Result<()>;
}

/// Default in-memory backend with lazy TTL sweeping.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, ConfirmSession>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_confirm_session(
        &self,
        pending: ConfirmPending,
        instruction: String,
        snapshot: Snapshot,
        plan: Plan,
    ) -> Result<String> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let session = ConfirmSession {
            id: id.clone(),
            pending,
            instruction,
            snapshot,
            plan,
            created_at: now,
        };
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| !s.is_expired(now));
        sessions.insert(id.clone(), session);
        debug!(session_id = %id, live = sessions.len(), "confirm session created");
        Ok(id)
    }

    async fn get_confirm_session(&self, id: &str) -> Result<Option<ConfirmSession>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(id)
            .filter(|s| !s.is_expired(Utc::now()))
            .cloned())
    }

    async fn delete_confirm_session(&self, id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(id).is_some() {
            debug!(session_id = %id, "confirm session deleted");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TransactionContext;

    fn pending() -> ConfirmPending {
        ConfirmPending {
            message: "Proceed?".to_string(),
            on_approve: vec![],
            on_reject: None,
            context: TransactionContext {
                snapshot: Snapshot::default(),
                variables: HashMap::new(),
                effects: vec![],
                trace: vec![],
            },
            remaining_steps: vec![],
        }
    }

    fn plan() -> Plan {
        Plan {
            version: 1,
            goal: "test".to_string(),
            steps: vec![],
            risk: None,
        }
    }

    #[tokio::test]
    async fn test_create_get_delete_round_trip() {
        let store = InMemorySessionStore::new();
        let id = store
            .create_confirm_session(pending(), "delete it".to_string(), Snapshot::default(), plan())
            .await
            .unwrap();

        let session = store.get_confirm_session(&id).await.unwrap().unwrap();
        assert_eq!(session.instruction, "delete it");
        assert_eq!(session.pending.message, "Proceed?");

        store.delete_confirm_session(&id).await.unwrap();
        assert!(store.get_confirm_session(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_id_is_none() {
        let store = InMemorySessionStore::new();
        assert!(store.get_confirm_session("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_gone() {
        let store = InMemorySessionStore::new();
        let id = store
            .create_confirm_session(pending(), "old".to_string(), Snapshot::default(), plan())
            .await
            .unwrap();
        {
            let mut sessions = store.sessions.write().await;
            sessions.get_mut(&id).unwrap().created_at =
                Utc::now() - chrono::Duration::seconds(301);
        }
        assert!(store.get_confirm_session(&id).await.unwrap().is_none());
    }
}
