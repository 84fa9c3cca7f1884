//! Crab Table - table-session and order-lifecycle reconciliation
//!
//! Customer devices and the staff console never share a lock. Both poll the
//! remote store, run the same pure reconciliation over the snapshot and
//! converge on one view of every table:
//!
//! - [`identity`]: per-table session id on the customer device
//! - [`claim`]: idempotent table claim
//! - [`submission`]: cart → order with bounded retry
//! - [`aggregator`]: unpaid orders grouped into accounts
//! - [`reconciler`]: authoritative per-table floor status
//! - [`settlement`]: close an account, tolerating partial failure
//! - [`watchdog`]: customer-side eviction detection
//! - [`console`]: staff poll loop with optimistic overlay
//! - [`customer`]: customer-side visit (identity, claim, orders, watchdog)

pub mod aggregator;
pub mod claim;
pub mod config;
pub mod console;
pub mod customer;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod logger;
pub mod reconciler;
pub mod retry;
pub mod settlement;
pub mod snapshot;
pub mod staff;
pub mod store;
pub mod submission;
pub mod watchdog;

pub use aggregator::{Account, AccountKey, ActiveOrderAggregator, AggregateView};
pub use config::EngineConfig;
pub use console::StaffConsole;
pub use customer::{CustomerTable, CustomerView};
pub use error::{ClientError, ClientResult, ErrorKind};
pub use identity::SessionIdentityProvider;
pub use reconciler::{FloorStatus, FloorView, status_of};
pub use settlement::{SettleOptions, SettlementEngine, SettlementOutcome, SettlementReport};
pub use staff::StaffActions;
pub use store::{MemoryStore, NetworkStore, RemoteStore};
pub use watchdog::{Eviction, EvictionCheck, EvictionWatchdog};
