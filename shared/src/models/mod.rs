//! Data models
//!
//! Wire shapes of the remote store: tables, table sessions and orders.
//! Tables are identified by their restaurant-scoped number; sessions by
//! the client-generated session id.

pub mod order;
pub mod session;
pub mod table;

// Re-exports
pub use order::*;
pub use session::*;
pub use table::*;
