//! In-process store
//!
//! Implements the store-side rules of the HTTP contract (idempotent claim,
//! close-all-sessions, forward-only order status) over plain collections.
//! Used by the engine tests and served over HTTP by `crab-store-mock`.
//! [`StoreFaults`] injects the failure modes seen in production: network
//! errors, "session has no associated table" lag, per-order write failures.

use super::RemoteStore;
use crate::error::ClientResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{
    Order, OrderItem, OrderStatus, SessionRef, SessionStatus, SystemSignal, Table, TableSession,
    TableStatus,
};
use shared::request::{
    CloseTableResponse, CreateOrderRequest, CreatedOrder, OrderListQuery, PageQuery,
    SessionListQuery, UpdateOrderStatusRequest,
};
use shared::types::TableNumber;
use shared::util::now_millis;
use shared::Page;
use std::collections::{BTreeMap, HashMap};

/// Injected failures, consumed one per matching call
#[derive(Debug, Clone, Default)]
pub struct StoreFaults {
    /// Next N create-order calls answer "session has no associated table"
    pub session_lag: u32,
    /// Next N claims fail with a network error
    pub claim_failures: u32,
    /// Next N list calls (tables, orders, sessions) fail with a network error
    pub list_failures: u32,
    /// Next N close-table calls fail with a network error
    pub close_failures: u32,
    /// Next N create-order calls fail with a network error
    pub create_failures: u32,
    /// Remaining status-update failures per order id
    pub order_update_failures: HashMap<String, u32>,
}

fn take(counter: &mut u32) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

fn network_fault(op: &str) -> AppError {
    AppError::with_message(ErrorCode::NetworkError, format!("Injected network failure: {}", op))
}

#[derive(Debug, Default)]
struct RestaurantData {
    tables: BTreeMap<TableNumber, Table>,
    sessions: Vec<TableSession>,
    orders: Vec<Order>,
}

#[derive(Debug, Default)]
struct MemoryState {
    restaurants: HashMap<String, RestaurantData>,
    order_seq: u64,
    faults: StoreFaults,
}

/// 内存存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Seeding & inspection ==========

    pub fn add_table(&self, restaurant: &str, table: Table) {
        let mut state = self.state.lock();
        let data = state.restaurants.entry(restaurant.to_string()).or_default();
        data.tables.insert(table.number, table);
    }

    pub fn add_tables(&self, restaurant: &str, numbers: impl IntoIterator<Item = TableNumber>) {
        for number in numbers {
            self.add_table(restaurant, Table::new(number));
        }
    }

    /// Insert a session as-is (duplicate / zombie sessions included)
    pub fn insert_session(&self, restaurant: &str, session: TableSession) {
        let mut state = self.state.lock();
        let data = state.restaurants.entry(restaurant.to_string()).or_default();
        data.sessions.push(session);
    }

    /// Insert an order as-is (unresolvable table/session included)
    pub fn insert_order(&self, restaurant: &str, order: Order) {
        let mut state = self.state.lock();
        let data = state.restaurants.entry(restaurant.to_string()).or_default();
        data.orders.push(order);
    }

    pub fn inject(&self, f: impl FnOnce(&mut StoreFaults)) {
        f(&mut self.state.lock().faults);
    }

    pub fn table(&self, restaurant: &str, number: TableNumber) -> Option<Table> {
        let state = self.state.lock();
        state
            .restaurants
            .get(restaurant)
            .and_then(|d| d.tables.get(&number).cloned())
    }

    pub fn order(&self, order_id: &str) -> Option<Order> {
        let state = self.state.lock();
        state
            .restaurants
            .values()
            .flat_map(|d| d.orders.iter())
            .find(|o| o.id == order_id)
            .cloned()
    }

    pub fn orders(&self, restaurant: &str) -> Vec<Order> {
        let state = self.state.lock();
        state
            .restaurants
            .get(restaurant)
            .map(|d| d.orders.clone())
            .unwrap_or_default()
    }

    pub fn sessions(&self, restaurant: &str) -> Vec<TableSession> {
        let state = self.state.lock();
        state
            .restaurants
            .get(restaurant)
            .map(|d| d.sessions.clone())
            .unwrap_or_default()
    }

    // ========== Contract operations ==========

    pub fn tables_page(&self, restaurant: &str, page: PageQuery) -> AppResult<Page<Table>> {
        let mut state = self.state.lock();
        if take(&mut state.faults.list_failures) {
            return Err(network_fault("list tables"));
        }
        let tables: Vec<Table> = state
            .restaurants
            .get(restaurant)
            .map(|d| d.tables.values().cloned().collect())
            .unwrap_or_default();
        Ok(Page::slice(&tables, page))
    }

    pub fn claim(
        &self,
        restaurant: &str,
        table: TableNumber,
        session_id: &str,
    ) -> AppResult<TableSession> {
        if session_id.trim().is_empty() {
            return Err(AppError::new(ErrorCode::SessionRequired));
        }

        let mut state = self.state.lock();
        if take(&mut state.faults.claim_failures) {
            return Err(network_fault("claim table"));
        }

        let data = state
            .restaurants
            .get_mut(restaurant)
            .ok_or_else(|| AppError::table_not_found(table))?;
        if !data.tables.contains_key(&table) {
            return Err(AppError::table_not_found(table));
        }

        let open: Vec<&TableSession> = data
            .sessions
            .iter()
            .filter(|s| s.is_open() && s.table == Some(table))
            .collect();

        if let Some(existing) = open.iter().find(|s| s.id == session_id) {
            return Ok((*existing).clone());
        }
        if !open.is_empty() {
            return Err(AppError::table_occupied(table));
        }

        let session = TableSession::open(session_id, table, now_millis());
        data.sessions.push(session.clone());
        if let Some(t) = data.tables.get_mut(&table) {
            t.status = TableStatus::Occupied;
        }
        Ok(session)
    }

    pub fn close(&self, restaurant: &str, table: TableNumber) -> AppResult<CloseTableResponse> {
        let mut state = self.state.lock();
        if take(&mut state.faults.close_failures) {
            return Err(network_fault("close table"));
        }

        let data = state
            .restaurants
            .get_mut(restaurant)
            .ok_or_else(|| AppError::table_not_found(table))?;
        let t = data
            .tables
            .get_mut(&table)
            .ok_or_else(|| AppError::table_not_found(table))?;
        t.status = TableStatus::Available;

        let now = now_millis();
        let mut closed_sessions = 0;
        for session in data
            .sessions
            .iter_mut()
            .filter(|s| s.is_open() && s.table == Some(table))
        {
            session.status = SessionStatus::Closed;
            session.closed_at = Some(now);
            closed_sessions += 1;
        }

        Ok(CloseTableResponse {
            table,
            closed_sessions,
        })
    }

    pub fn set_status(
        &self,
        restaurant: &str,
        table: TableNumber,
        status: TableStatus,
    ) -> AppResult<Table> {
        let mut state = self.state.lock();
        let t = state
            .restaurants
            .get_mut(restaurant)
            .and_then(|d| d.tables.get_mut(&table))
            .ok_or_else(|| AppError::table_not_found(table))?;
        t.status = status;
        Ok(t.clone())
    }

    pub fn orders_page(&self, restaurant: &str, query: &OrderListQuery) -> AppResult<Page<Order>> {
        let mut state = self.state.lock();
        if take(&mut state.faults.list_failures) {
            return Err(network_fault("list orders"));
        }
        let mut orders: Vec<Order> = state
            .restaurants
            .get(restaurant)
            .map(|d| {
                d.orders
                    .iter()
                    .filter(|o| query.matches(o.status))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(Page::slice(&orders, query.page_query()))
    }

    pub fn create_order(
        &self,
        restaurant: &str,
        request: &CreateOrderRequest,
    ) -> AppResult<CreatedOrder> {
        if request.session_id.trim().is_empty() {
            return Err(AppError::new(ErrorCode::SessionRequired));
        }
        if request.items.is_empty() {
            return Err(AppError::new(ErrorCode::OrderEmpty));
        }
        if request.items.iter().any(|i| i.quantity == 0 || i.unit_price < Decimal::ZERO) {
            return Err(AppError::new(ErrorCode::OrderInvalidItem));
        }

        let is_system = request
            .items
            .iter()
            .all(|i| SystemSignal::from_product_id(&i.product_id).is_some());
        let total = request.total();
        if (is_system && !total.is_zero()) || (!is_system && total <= Decimal::ZERO) {
            return Err(AppError::with_message(
                ErrorCode::OrderInvalidTotal,
                format!("Invalid order total {}", total),
            ));
        }

        let mut state = self.state.lock();
        if take(&mut state.faults.create_failures) {
            return Err(network_fault("create_order"));
        }
        let data = state
            .restaurants
            .get(restaurant)
            .ok_or_else(|| AppError::table_not_found(request.table))?;
        if !data.tables.contains_key(&request.table) {
            return Err(AppError::table_not_found(request.table));
        }
        let bound = data
            .sessions
            .iter()
            .any(|s| s.is_open() && s.id == request.session_id && s.table == Some(request.table));

        if take(&mut state.faults.session_lag) {
            return Err(AppError::new(ErrorCode::SessionWithoutTable)
                .with_detail("session_id", request.session_id.clone()));
        }
        if !bound {
            return Err(AppError::with_message(
                ErrorCode::SessionTableMismatch,
                format!(
                    "Session {} is not open on table {}",
                    request.session_id, request.table
                ),
            ));
        }

        state.order_seq += 1;
        let id = format!("ord-{:06}", state.order_seq);
        let data = state
            .restaurants
            .get_mut(restaurant)
            .ok_or_else(|| AppError::internal("restaurant vanished"))?;

        let now = now_millis();
        data.orders.push(Order {
            id: id.clone(),
            status: OrderStatus::Pending,
            total,
            created_at: now,
            updated_at: now,
            notes: request.notes.clone(),
            items: request
                .items
                .iter()
                .map(|i| OrderItem {
                    product_id: i.product_id.clone(),
                    name: i.name.clone(),
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                    notes: i.notes.clone(),
                })
                .collect(),
            table_session: Some(SessionRef {
                session_id: Some(request.session_id.clone()),
                table: Some(request.table),
            }),
            discount: None,
        });

        Ok(CreatedOrder { id, total })
    }

    pub fn update_status(
        &self,
        order_id: &str,
        request: &UpdateOrderStatusRequest,
    ) -> AppResult<Order> {
        let mut state = self.state.lock();

        if let Some(remaining) = state.faults.order_update_failures.get_mut(order_id)
            && take(remaining)
        {
            return Err(network_fault("update order status"));
        }

        let order = state
            .restaurants
            .values_mut()
            .flat_map(|d| d.orders.iter_mut())
            .find(|o| o.id == order_id)
            .ok_or_else(|| AppError::order_not_found(order_id))?;

        if order.status == request.status {
            return Ok(order.clone());
        }
        if !order.status.can_transition_to(request.status) {
            let code = match order.status {
                OrderStatus::Paid => ErrorCode::OrderAlreadyPaid,
                OrderStatus::Cancelled => ErrorCode::OrderCancelled,
                _ => ErrorCode::OrderInvalidTransition,
            };
            return Err(AppError::with_message(
                code,
                format!(
                    "Order {} cannot move from {} to {}",
                    order_id, order.status, request.status
                ),
            ));
        }

        order.status = request.status;
        if request.discount.is_some() {
            order.discount = request.discount;
        }
        order.updated_at = now_millis();
        Ok(order.clone())
    }

    pub fn sessions_page(
        &self,
        restaurant: &str,
        query: &SessionListQuery,
    ) -> AppResult<Page<TableSession>> {
        let mut state = self.state.lock();
        if take(&mut state.faults.list_failures) {
            return Err(network_fault("list sessions"));
        }
        let mut sessions: Vec<TableSession> = state
            .restaurants
            .get(restaurant)
            .map(|d| {
                d.sessions
                    .iter()
                    .filter(|s| query.status.is_none_or(|status| s.status == status))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        sessions.sort_by_key(|s| s.opened_at);
        Ok(Page::slice(&sessions, query.page_query()))
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list_tables(&self, restaurant: &str, page: PageQuery) -> ClientResult<Page<Table>> {
        Ok(self.tables_page(restaurant, page)?)
    }

    async fn claim_table(
        &self,
        restaurant: &str,
        table: TableNumber,
        session_id: &str,
    ) -> ClientResult<TableSession> {
        Ok(self.claim(restaurant, table, session_id)?)
    }

    async fn close_table(
        &self,
        restaurant: &str,
        table: TableNumber,
    ) -> ClientResult<CloseTableResponse> {
        Ok(self.close(restaurant, table)?)
    }

    async fn set_table_status(
        &self,
        restaurant: &str,
        table: TableNumber,
        status: TableStatus,
    ) -> ClientResult<Table> {
        Ok(self.set_status(restaurant, table, status)?)
    }

    async fn list_orders(
        &self,
        restaurant: &str,
        query: &OrderListQuery,
    ) -> ClientResult<Page<Order>> {
        Ok(self.orders_page(restaurant, query)?)
    }

    async fn create_order(
        &self,
        restaurant: &str,
        request: &CreateOrderRequest,
    ) -> ClientResult<CreatedOrder> {
        Ok(MemoryStore::create_order(self, restaurant, request)?)
    }

    async fn update_order_status(
        &self,
        order_id: &str,
        request: &UpdateOrderStatusRequest,
    ) -> ClientResult<Order> {
        Ok(self.update_status(order_id, request)?)
    }

    async fn list_sessions(
        &self,
        restaurant: &str,
        query: &SessionListQuery,
    ) -> ClientResult<Page<TableSession>> {
        Ok(self.sessions_page(restaurant, query)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::request::OrderItemInput;

    const R: &str = "roma";

    fn order_request(table: TableNumber, session_id: &str, price: i64) -> CreateOrderRequest {
        CreateOrderRequest {
            table,
            session_id: session_id.to_string(),
            items: vec![OrderItemInput::new("p1", 1, Decimal::new(price, 0))],
            notes: None,
        }
    }

    #[test]
    fn test_claim_creates_session_and_occupies_table() {
        let store = MemoryStore::new();
        store.add_tables(R, [7]);

        let session = store.claim(R, 7, "s1").unwrap();
        assert_eq!(session.table, Some(7));
        assert!(session.is_open());
        assert_eq!(store.table(R, 7).unwrap().status, TableStatus::Occupied);
    }

    #[test]
    fn test_claim_rejections() {
        let store = MemoryStore::new();
        store.add_tables(R, [7]);
        store.claim(R, 7, "s1").unwrap();

        let conflict = store.claim(R, 7, "s2").unwrap_err();
        assert_eq!(conflict.code, ErrorCode::TableOccupied);

        let missing = store.claim(R, 99, "s1").unwrap_err();
        assert_eq!(missing.code, ErrorCode::TableNotFound);

        let empty = store.claim(R, 7, " ").unwrap_err();
        assert_eq!(empty.code, ErrorCode::SessionRequired);
    }

    #[test]
    fn test_close_releases_every_open_session() {
        let store = MemoryStore::new();
        store.add_tables(R, [3]);
        store.claim(R, 3, "s1").unwrap();
        store.insert_session(R, TableSession::open("zombie", 3, 1));

        let response = store.close(R, 3).unwrap();
        assert_eq!(response.closed_sessions, 2);
        assert!(store.sessions(R).iter().all(|s| !s.is_open()));
        assert_eq!(store.table(R, 3).unwrap().status, TableStatus::Available);
    }

    #[test]
    fn test_create_order_requires_open_session_on_table() {
        let store = MemoryStore::new();
        store.add_tables(R, [1, 2]);
        store.claim(R, 1, "s1").unwrap();

        let created = store.create_order(R, &order_request(1, "s1", 12)).unwrap();
        assert_eq!(created.total, Decimal::new(12, 0));

        let mismatch = store.create_order(R, &order_request(2, "s1", 12)).unwrap_err();
        assert_eq!(mismatch.code, ErrorCode::SessionTableMismatch);
    }

    #[test]
    fn test_session_lag_fault_is_consumed() {
        let store = MemoryStore::new();
        store.add_tables(R, [1]);
        store.claim(R, 1, "s1").unwrap();
        store.inject(|f| f.session_lag = 1);

        let lag = store.create_order(R, &order_request(1, "s1", 5)).unwrap_err();
        assert_eq!(lag.code, ErrorCode::SessionWithoutTable);
        assert!(store.create_order(R, &order_request(1, "s1", 5)).is_ok());
    }

    #[test]
    fn test_paid_order_never_regresses() {
        let store = MemoryStore::new();
        store.add_tables(R, [1]);
        store.claim(R, 1, "s1").unwrap();
        let created = store.create_order(R, &order_request(1, "s1", 5)).unwrap();

        let paid = UpdateOrderStatusRequest::new(OrderStatus::Paid);
        store.update_status(&created.id, &paid).unwrap();
        // Re-paying is a no-op
        assert_eq!(
            store.update_status(&created.id, &paid).unwrap().status,
            OrderStatus::Paid
        );

        let back = UpdateOrderStatusRequest::new(OrderStatus::Pending);
        let err = store.update_status(&created.id, &back).unwrap_err();
        assert_eq!(err.code, ErrorCode::OrderAlreadyPaid);
        assert_eq!(store.order(&created.id).unwrap().status, OrderStatus::Paid);
    }

    #[test]
    fn test_unpaid_listing_excludes_paid() {
        let store = MemoryStore::new();
        store.add_tables(R, [1]);
        store.claim(R, 1, "s1").unwrap();
        let a = store.create_order(R, &order_request(1, "s1", 5)).unwrap();
        store.create_order(R, &order_request(1, "s1", 6)).unwrap();
        store
            .update_status(&a.id, &UpdateOrderStatusRequest::new(OrderStatus::Paid))
            .unwrap();

        let page = store
            .orders_page(R, &OrderListQuery::unpaid(PageQuery::default()))
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].total, Decimal::new(6, 0));
    }
}
