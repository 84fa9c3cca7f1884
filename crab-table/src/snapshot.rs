//! One consistent-enough read of the remote store

use crate::error::ClientResult;
use crate::store::{RemoteStore, fetch_all_tables, fetch_open_sessions, fetch_unpaid_orders};
use shared::models::{Order, Table, TableSession};
use shared::types::{TableNumber, Timestamp};
use shared::util::now_millis;

/// Tables, open sessions and non-paid orders fetched in one poll
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub tables: Vec<Table>,
    pub sessions: Vec<TableSession>,
    pub orders: Vec<Order>,
    pub fetched_at: Timestamp,
}

impl StoreSnapshot {
    pub fn table(&self, number: TableNumber) -> Option<&Table> {
        self.tables.iter().find(|t| t.number == number)
    }
}

/// Fetch the three lists concurrently, every page of each
pub async fn fetch_snapshot(
    store: &dyn RemoteStore,
    restaurant: &str,
    per_page: u32,
) -> ClientResult<StoreSnapshot> {
    let (tables, sessions, orders) = tokio::try_join!(
        fetch_all_tables(store, restaurant, per_page),
        fetch_open_sessions(store, restaurant, per_page),
        fetch_unpaid_orders(store, restaurant, per_page),
    )?;

    tracing::debug!(
        restaurant,
        tables = tables.len(),
        sessions = sessions.len(),
        orders = orders.len(),
        "Snapshot fetched"
    );

    Ok(StoreSnapshot {
        tables,
        sessions,
        orders,
        fetched_at: now_millis(),
    })
}
