//! Table Claim Protocol - 开台

use crate::error::{ClientError, ClientResult};
use crate::retry::{RetryPolicy, with_retry};
use crate::store::RemoteStore;
use shared::models::TableSession;
use shared::types::TableNumber;
use std::sync::Arc;

/// Claims tables on behalf of customer sessions
#[derive(Clone)]
pub struct TableClaimer {
    store: Arc<dyn RemoteStore>,
    restaurant: String,
    policy: RetryPolicy,
}

impl TableClaimer {
    pub fn new(store: Arc<dyn RemoteStore>, restaurant: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            store,
            restaurant: restaurant.into(),
            policy,
        }
    }

    /// Idempotent claim of `table` for `session_id`
    ///
    /// Transient failures are retried within the policy. Conflict and
    /// NotFound are returned on the first occurrence.
    pub async fn claim(&self, table: TableNumber, session_id: &str) -> ClientResult<TableSession> {
        if session_id.trim().is_empty() {
            return Err(ClientError::Validation("A session id is required to claim a table".into()));
        }

        let store = &self.store;
        let restaurant = self.restaurant.as_str();
        let result = with_retry(self.policy, "claim_table", ClientError::is_transient, move |_| {
            store.claim_table(restaurant, table, session_id)
        })
        .await;

        match &result {
            Ok(session) => {
                tracing::info!(restaurant, table, session_id = %session.id, "Table claimed");
            }
            Err(e) => {
                tracing::warn!(restaurant, table, session_id, error = %e, kind = ?e.kind(), "Table claim failed");
            }
        }
        result
    }
}
