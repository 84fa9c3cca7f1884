//! Remote store contract
//!
//! The store is the only synchronization point between customer devices and
//! the staff console. Every list operation is paginated; callers go through
//! [`collect_pages`] so a single page is never mistaken for the full set.

mod http;
mod memory;

pub use http::NetworkStore;
pub use memory::{MemoryStore, StoreFaults};

use crate::error::ClientResult;
use async_trait::async_trait;
use shared::Page;
use shared::models::{Order, Table, TableSession, TableStatus};
use shared::request::{
    CloseTableResponse, CreateOrderRequest, CreatedOrder, OrderListQuery, PageQuery,
    SessionListQuery, UpdateOrderStatusRequest,
};
use shared::types::TableNumber;
use std::future::Future;

/// Hard stop for page iteration against a misbehaving store
const MAX_PAGES: u32 = 1000;

/// Remote store operations used by the engine
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list_tables(&self, restaurant: &str, page: PageQuery) -> ClientResult<Page<Table>>;

    /// Idempotent claim. Conflict when another session holds the table,
    /// NotFound when the table does not exist.
    async fn claim_table(
        &self,
        restaurant: &str,
        table: TableNumber,
        session_id: &str,
    ) -> ClientResult<TableSession>;

    /// Close every open session of the table and set it available
    async fn close_table(
        &self,
        restaurant: &str,
        table: TableNumber,
    ) -> ClientResult<CloseTableResponse>;

    async fn set_table_status(
        &self,
        restaurant: &str,
        table: TableNumber,
        status: TableStatus,
    ) -> ClientResult<Table>;

    async fn list_orders(
        &self,
        restaurant: &str,
        query: &OrderListQuery,
    ) -> ClientResult<Page<Order>>;

    async fn create_order(
        &self,
        restaurant: &str,
        request: &CreateOrderRequest,
    ) -> ClientResult<CreatedOrder>;

    /// Naturally idempotent: re-setting the current status is a no-op
    async fn update_order_status(
        &self,
        order_id: &str,
        request: &UpdateOrderStatusRequest,
    ) -> ClientResult<Order>;

    async fn list_sessions(
        &self,
        restaurant: &str,
        query: &SessionListQuery,
    ) -> ClientResult<Page<TableSession>>;
}

/// Iterate pages until exhaustion
pub async fn collect_pages<T, F, Fut>(per_page: u32, mut fetch: F) -> ClientResult<Vec<T>>
where
    F: FnMut(PageQuery) -> Fut,
    Fut: Future<Output = ClientResult<Page<T>>>,
{
    let mut query = PageQuery::new(1, per_page.max(1));
    let mut items = Vec::new();

    loop {
        let page = fetch(query).await?;
        let has_more = page.has_more();
        items.extend(page.items);

        if !has_more {
            break;
        }
        if query.page >= MAX_PAGES {
            tracing::warn!(pages = query.page, "Page limit reached, result may be truncated");
            break;
        }
        query = query.next();
    }

    Ok(items)
}

pub async fn fetch_all_tables(
    store: &dyn RemoteStore,
    restaurant: &str,
    per_page: u32,
) -> ClientResult<Vec<Table>> {
    collect_pages(per_page, move |page| store.list_tables(restaurant, page)).await
}

/// Every order whose status is not `paid`
pub async fn fetch_unpaid_orders(
    store: &dyn RemoteStore,
    restaurant: &str,
    per_page: u32,
) -> ClientResult<Vec<Order>> {
    collect_pages(per_page, move |page| async move {
        let query = OrderListQuery::unpaid(page);
        store.list_orders(restaurant, &query).await
    })
    .await
}

pub async fn fetch_open_sessions(
    store: &dyn RemoteStore,
    restaurant: &str,
    per_page: u32,
) -> ClientResult<Vec<TableSession>> {
    collect_pages(per_page, move |page| async move {
        let query = SessionListQuery::open(page);
        store.list_sessions(restaurant, &query).await
    })
    .await
}
