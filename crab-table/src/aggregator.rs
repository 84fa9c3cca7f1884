//! Active-Order Aggregator
//!
//! Groups non-settled orders into accounts. [`aggregate`] is a pure function
//! of one store read; [`ActiveOrderAggregator`] adds the fetch and a cache
//! of the previous view, which is served (marked stale) when a poll fails.

use crate::error::ClientResult;
use crate::store::{RemoteStore, fetch_open_sessions, fetch_unpaid_orders};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use shared::models::{Order, OrderStatus, SystemSignal, TableSession};
use shared::types::{TableNumber, Timestamp};
use shared::util::now_millis;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Grouping key, strongest first: table, then session, then the order itself
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccountKey {
    Table(TableNumber),
    Session(String),
    Order(String),
}

/// 账单 - derived grouping of non-settled orders, never stored
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub key: AccountKey,
    pub table: Option<TableNumber>,
    pub session_ids: BTreeSet<String>,
    /// Regular orders
    pub orders: Vec<Order>,
    /// System orders of the same group (settled together with the account)
    pub signal_orders: Vec<Order>,
    pub total: Decimal,
    pub has_unpaid: bool,
}

impl Account {
    fn new(key: AccountKey, table: Option<TableNumber>) -> Self {
        Self {
            key,
            table,
            session_ids: BTreeSet::new(),
            orders: Vec::new(),
            signal_orders: Vec::new(),
            total: Decimal::ZERO,
            has_unpaid: false,
        }
    }

    /// Every order settlement has to mark paid
    pub fn all_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter().chain(self.signal_orders.iter())
    }

    /// All regular orders have been served
    pub fn awaiting_payment(&self) -> bool {
        !self.orders.is_empty() && self.orders.iter().all(|o| o.status == OrderStatus::Served)
    }
}

/// Call-waiter / request-payment still waiting for staff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSignal {
    pub order_id: String,
    pub signal: SystemSignal,
    pub table: Option<TableNumber>,
    pub session_id: Option<String>,
    pub created_at: Timestamp,
}

/// A system order waits for staff until it has been served or paid
fn is_pending_signal(order: &Order) -> bool {
    order.is_system() && matches!(order.status, OrderStatus::Pending | OrderStatus::Preparing)
}

/// Result of one aggregation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateView {
    pub accounts: Vec<Account>,
    pub signals: Vec<PendingSignal>,
    /// The last fetch failed and this is the previous view
    pub stale: bool,
    pub fetched_at: Timestamp,
}

impl AggregateView {
    pub fn account(&self, key: &AccountKey) -> Option<&Account> {
        self.accounts.iter().find(|a| &a.key == key)
    }

    pub fn account_for_table(&self, table: TableNumber) -> Option<&Account> {
        self.account(&AccountKey::Table(table))
    }

    pub fn signals_for_table(&self, table: TableNumber) -> impl Iterator<Item = &PendingSignal> {
        self.signals.iter().filter(move |s| s.table == Some(table))
    }

    /// Highest-priority pending signal of the table (payment before waiter)
    pub fn pending_signal(&self, table: TableNumber) -> Option<SystemSignal> {
        let mut signals: Vec<SystemSignal> = self.signals_for_table(table).map(|s| s.signal).collect();
        if signals.contains(&SystemSignal::RequestPayment) {
            return Some(SystemSignal::RequestPayment);
        }
        signals.pop()
    }

    /// Non-settled regular orders of the table (what the customer sees)
    pub fn active_order_count(&self, table: TableNumber) -> usize {
        self.account_for_table(table).map_or(0, |a| a.orders.len())
    }

    pub fn total(&self) -> Decimal {
        self.accounts.iter().map(|a| a.total).sum()
    }
}

/// Table of an order: its own back-reference, else its session's table
pub fn resolve_table(order: &Order, sessions: &HashMap<&str, TableNumber>) -> Option<TableNumber> {
    order
        .table()
        .or_else(|| order.session_id().and_then(|id| sessions.get(id).copied()))
}

fn key_of(order: &Order, table: Option<TableNumber>) -> AccountKey {
    match (table, order.session_id()) {
        (Some(table), _) => AccountKey::Table(table),
        (None, Some(session_id)) => AccountKey::Session(session_id.to_string()),
        (None, None) => AccountKey::Order(order.id.clone()),
    }
}

/// 聚合：pure function of one read
///
/// Settled orders (paid, cancelled) are ignored even if the store returned
/// them. Orders with neither table nor session form single-order accounts.
/// System orders never add to a total; a group holding only system orders
/// becomes a zero-total account so it can still be settled.
pub fn aggregate(orders: &[Order], sessions: &[TableSession], fetched_at: Timestamp) -> AggregateView {
    let session_tables: HashMap<&str, TableNumber> = sessions
        .iter()
        .filter(|s| s.is_open())
        .filter_map(|s| s.table.map(|t| (s.id.as_str(), t)))
        .collect();

    let mut accounts: BTreeMap<AccountKey, Account> = BTreeMap::new();
    let mut system_orders: BTreeMap<AccountKey, (Option<TableNumber>, Vec<Order>)> = BTreeMap::new();
    let mut signals = Vec::new();

    for order in orders.iter().filter(|o| !o.status.is_settled()) {
        let table = resolve_table(order, &session_tables);
        let key = key_of(order, table);

        if let Some(signal) = order.system_signal() {
            if is_pending_signal(order) {
                signals.push(PendingSignal {
                    order_id: order.id.clone(),
                    signal,
                    table,
                    session_id: order.session_id().map(str::to_string),
                    created_at: order.created_at,
                });
            }
            system_orders
                .entry(key)
                .or_insert_with(|| (table, Vec::new()))
                .1
                .push(order.clone());
            continue;
        }

        let account = accounts
            .entry(key.clone())
            .or_insert_with(|| Account::new(key, table));
        if let Some(session_id) = order.session_id() {
            account.session_ids.insert(session_id.to_string());
        }
        account.total += order.total;
        account.has_unpaid = true;
        account.orders.push(order.clone());
    }

    // A group with only system orders still owes a settlement: zero total
    for (key, (table, orders)) in system_orders {
        let account = accounts
            .entry(key.clone())
            .or_insert_with(|| Account::new(key, table));
        for session_id in orders.iter().filter_map(|o| o.session_id()) {
            account.session_ids.insert(session_id.to_string());
        }
        account.has_unpaid = true;
        account.signal_orders = orders;
    }

    for account in accounts.values_mut() {
        account.orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    }
    signals.sort_by_key(|s| s.created_at);

    AggregateView {
        accounts: accounts.into_values().collect(),
        signals,
        stale: false,
        fetched_at,
    }
}

/// 活跃订单聚合器
pub struct ActiveOrderAggregator {
    store: Arc<dyn RemoteStore>,
    restaurant: String,
    page_size: u32,
    cache: Mutex<Option<AggregateView>>,
}

impl ActiveOrderAggregator {
    pub fn new(store: Arc<dyn RemoteStore>, restaurant: impl Into<String>, page_size: u32) -> Self {
        Self {
            store,
            restaurant: restaurant.into(),
            page_size,
            cache: Mutex::new(None),
        }
    }

    pub fn restaurant(&self) -> &str {
        &self.restaurant
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Fetch every non-paid order and open session, then aggregate
    ///
    /// A failed fetch returns the previous view marked stale; with no
    /// previous view the error is returned.
    pub async fn refresh(&self) -> ClientResult<AggregateView> {
        let store = self.store.as_ref();
        let fetched = tokio::try_join!(
            fetch_unpaid_orders(store, &self.restaurant, self.page_size),
            fetch_open_sessions(store, &self.restaurant, self.page_size),
        );

        match fetched {
            Ok((orders, sessions)) => Ok(self.ingest(&orders, &sessions, now_millis())),
            Err(e) => {
                tracing::warn!(restaurant = %self.restaurant, error = %e, "Order refresh failed");
                self.mark_stale().ok_or(e)
            }
        }
    }

    /// Aggregate an already fetched read and cache the result
    pub fn ingest(&self, orders: &[Order], sessions: &[TableSession], fetched_at: Timestamp) -> AggregateView {
        let view = aggregate(orders, sessions, fetched_at);
        *self.cache.lock() = Some(view.clone());
        view
    }

    /// Previous view, flagged stale
    pub fn mark_stale(&self) -> Option<AggregateView> {
        let mut cache = self.cache.lock();
        cache.as_mut().map(|view| {
            view.stale = true;
            view.clone()
        })
    }

    pub fn cached(&self) -> Option<AggregateView> {
        self.cache.lock().clone()
    }
}

/// Reports orders that arrived since the previous poll
///
/// The first observation only primes the set, so a console starting up
/// does not announce every open order as new.
#[derive(Debug, Default)]
pub struct SeenOrders {
    seen: HashSet<String>,
    primed: bool,
}

impl SeenOrders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, orders: &[Order]) -> Vec<String> {
        let current: HashSet<String> = orders.iter().map(|o| o.id.clone()).collect();
        let fresh = if self.primed {
            orders
                .iter()
                .filter(|o| !self.seen.contains(&o.id))
                .map(|o| o.id.clone())
                .collect()
        } else {
            Vec::new()
        };
        self.seen = current;
        self.primed = true;
        fresh
    }
}
