//! Table Session Model

use crate::types::{TableNumber, Timestamp};
use serde::{Deserialize, Serialize};

/// Session status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Open,
    Closed,
}

/// One continuous occupancy of a table by one party (一次就餐)
///
/// `id` is the client-generated session id. `table` is optional on the
/// wire because a freshly claimed session may not be joined to its table
/// yet when read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSession {
    pub id: String,
    #[serde(default)]
    pub table: Option<TableNumber>,
    #[serde(default)]
    pub status: SessionStatus,
    pub opened_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<Timestamp>,
}

impl TableSession {
    pub fn open(id: impl Into<String>, table: TableNumber, opened_at: Timestamp) -> Self {
        Self {
            id: id.into(),
            table: Some(table),
            status: SessionStatus::Open,
            opened_at,
            closed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }
}
