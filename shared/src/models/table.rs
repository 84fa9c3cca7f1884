//! Dining Table Model

use crate::types::TableNumber;
use serde::{Deserialize, Serialize};

/// Explicit table status as stored by the remote store (桌台状态)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    #[default]
    Available,
    Occupied,
    NeedsCleaning,
}

impl TableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Occupied => "occupied",
            Self::NeedsCleaning => "needs_cleaning",
        }
    }
}

impl std::fmt::Display for TableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dining table entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Table {
    pub number: TableNumber,
    #[serde(default)]
    pub status: TableStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Table {
    pub fn new(number: TableNumber) -> Self {
        Self {
            number,
            status: TableStatus::Available,
            name: None,
        }
    }

    pub fn with_status(mut self, status: TableStatus) -> Self {
        self.status = status;
        self
    }
}
