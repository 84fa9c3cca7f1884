//! Shared types for Crab Table
//!
//! Wire models, error codes and response envelopes used by both the
//! reconciliation engine (`crab-table`) and the mock store server.

pub mod error;
pub mod models;
pub mod request;
pub mod response;
pub mod types;
pub mod util;

// Re-exports
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};
pub use response::Page;
pub use types::{RestaurantSlug, TableNumber, Timestamp};
