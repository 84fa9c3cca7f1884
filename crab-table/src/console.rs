//! Staff Console - 收银台轮询
//!
//! Fixed-interval loop: fetch a snapshot, reconcile the floor, aggregate
//! accounts, diff against the previous floor, publish. Staff actions update
//! the published floor optimistically; the next successful poll replaces
//! the overlay with what the store says.

use crate::aggregator::{Account, ActiveOrderAggregator, AggregateView, SeenOrders};
use crate::config::EngineConfig;
use crate::error::{ClientError, ClientResult};
use crate::reconciler::{FloorChange, FloorStatus, FloorView, diff, reconcile_floor};
use crate::settlement::{SettleOptions, SettlementEngine, SettlementReport};
use crate::snapshot::fetch_snapshot;
use crate::staff::StaffActions;
use crate::store::RemoteStore;
use parking_lot::Mutex;
use shared::models::{Order, OrderStatus, Table};
use shared::request::CloseTableResponse;
use shared::types::TableNumber;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// What the console shows
#[derive(Debug, Clone, Default)]
pub struct ConsoleState {
    pub floor: FloorView,
    pub accounts: AggregateView,
    /// Non-paid orders of the last successful poll
    pub open_orders: Vec<Order>,
    /// Tables changed by the last publish
    pub changes: Vec<FloorChange>,
    /// Orders that arrived since the previous poll
    pub new_orders: Vec<String>,
    /// Tables whose optimistic status the store did not confirm
    pub reverted: Vec<TableNumber>,
    /// The last poll failed; this is the previous view
    pub stale: bool,
    pub revision: u64,
}

impl ConsoleState {
    pub fn order(&self, order_id: &str) -> Option<&Order> {
        self.open_orders.iter().find(|o| o.id == order_id)
    }
}

/// 收银台
pub struct StaffConsole {
    store: Arc<dyn RemoteStore>,
    restaurant: String,
    poll_interval: Duration,
    page_size: u32,
    aggregator: ActiveOrderAggregator,
    settlement: SettlementEngine,
    staff: StaffActions,
    state: watch::Sender<Arc<ConsoleState>>,
    /// Optimistic statuses, dropped by the next successful poll
    overlay: Mutex<HashMap<TableNumber, FloorStatus>>,
    seen: Mutex<SeenOrders>,
    refresh: Arc<Notify>,
}

impl StaffConsole {
    pub fn new(store: Arc<dyn RemoteStore>, config: &EngineConfig) -> Self {
        let refresh = Arc::new(Notify::new());
        let restaurant = config.restaurant.clone();
        let (state, _) = watch::channel(Arc::new(ConsoleState::default()));

        Self {
            aggregator: ActiveOrderAggregator::new(store.clone(), restaurant.clone(), config.page_size),
            settlement: SettlementEngine::new(
                store.clone(),
                restaurant.clone(),
                config.write_policy(),
                config.settle_wait,
                config.page_size,
            )
            .with_reconcile_trigger(refresh.clone()),
            staff: StaffActions::new(store.clone(), restaurant.clone(), config.write_policy())
                .with_page_size(config.page_size),
            store,
            restaurant,
            poll_interval: config.poll_interval,
            page_size: config.page_size,
            state,
            overlay: Mutex::new(HashMap::new()),
            seen: Mutex::new(SeenOrders::new()),
            refresh,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ConsoleState>> {
        self.state.subscribe()
    }

    pub fn state(&self) -> Arc<ConsoleState> {
        self.state.borrow().clone()
    }

    /// Notify this to poll ahead of the next tick
    pub fn refresh_trigger(&self) -> Arc<Notify> {
        self.refresh.clone()
    }

    /// One fetch → reconcile → diff → publish pass
    ///
    /// A failed fetch republishes the previous view marked stale. The error
    /// is returned only when nothing was ever fetched.
    pub async fn poll_once(&self) -> ClientResult<Arc<ConsoleState>> {
        let snapshot = match fetch_snapshot(self.store.as_ref(), &self.restaurant, self.page_size).await {
            Ok(snapshot) => snapshot,
            Err(e) => return self.publish_stale(e),
        };

        let floor = reconcile_floor(&snapshot.tables, &snapshot.sessions, &snapshot.orders);
        let accounts = self
            .aggregator
            .ingest(&snapshot.orders, &snapshot.sessions, snapshot.fetched_at);
        let new_orders = self.seen.lock().observe(&snapshot.orders);

        // Last fetch wins
        let reverted = self.settle_overlay(&floor);

        let previous = self.state();
        let changes = diff(&previous.floor, &floor);
        if !changes.is_empty() || !new_orders.is_empty() {
            tracing::info!(
                restaurant = %self.restaurant,
                changed_tables = changes.len(),
                new_orders = new_orders.len(),
                "Floor updated"
            );
        }

        let next = Arc::new(ConsoleState {
            floor,
            accounts,
            open_orders: snapshot.orders,
            changes,
            new_orders,
            reverted,
            stale: false,
            revision: previous.revision + 1,
        });
        self.state.send_replace(next.clone());
        Ok(next)
    }

    /// Drop the overlay, reporting entries the fetched floor contradicts
    fn settle_overlay(&self, floor: &FloorView) -> Vec<TableNumber> {
        let overlay = std::mem::take(&mut *self.overlay.lock());
        let mut reverted: Vec<TableNumber> = overlay
            .into_iter()
            .filter(|(table, expected)| floor.status(*table) != Some(*expected))
            .map(|(table, expected)| {
                tracing::warn!(
                    restaurant = %self.restaurant,
                    table,
                    expected = %expected,
                    actual = ?floor.status(table).map(|s| s.label()),
                    "Optimistic update not confirmed by the store"
                );
                table
            })
            .collect();
        reverted.sort_unstable();
        reverted
    }

    fn publish_stale(&self, error: ClientError) -> ClientResult<Arc<ConsoleState>> {
        tracing::warn!(restaurant = %self.restaurant, error = %error, "Console poll failed");
        let previous = self.state();
        if previous.revision == 0 {
            return Err(error);
        }

        let mut next = (*previous).clone();
        next.stale = true;
        next.changes.clear();
        next.new_orders.clear();
        next.reverted.clear();
        if let Some(accounts) = self.aggregator.mark_stale() {
            next.accounts = accounts;
        }
        let next = Arc::new(next);
        self.state.send_replace(next.clone());
        Ok(next)
    }

    /// Show `status` for `table` until the next poll
    fn apply_optimistic(&self, table: TableNumber, status: FloorStatus) {
        self.overlay.lock().insert(table, status);

        self.state.send_if_modified(|state| {
            let Some(entry) = state.floor.entries.get(&table) else {
                return false;
            };
            if entry.status == status {
                return false;
            }

            let mut next = (**state).clone();
            let before = next.floor.entries.get(&table).cloned();
            if let Some(entry) = next.floor.entries.get_mut(&table) {
                entry.status = status;
            }
            next.changes = vec![FloorChange {
                table,
                before,
                after: next.floor.entries.get(&table).cloned(),
            }];
            next.new_orders.clear();
            next.reverted.clear();
            next.revision += 1;
            *state = Arc::new(next);
            true
        });
    }

    /// Optimistic statuses not yet confirmed by a poll
    pub fn pending_overlay(&self) -> HashMap<TableNumber, FloorStatus> {
        self.overlay.lock().clone()
    }

    pub fn account_for_table(&self, table: TableNumber) -> Option<Account> {
        self.state().accounts.account_for_table(table).cloned()
    }

    /// Settle the account of `table` from the last published view
    pub async fn settle_table(
        &self,
        table: TableNumber,
        options: SettleOptions,
    ) -> ClientResult<SettlementReport> {
        let account = self.account_for_table(table).ok_or_else(|| {
            ClientError::Validation(format!("Table {} has no open account", table))
        })?;
        self.settle_account(&account, options).await
    }

    pub async fn settle_account(
        &self,
        account: &Account,
        options: SettleOptions,
    ) -> ClientResult<SettlementReport> {
        if let Some(table) = account.table {
            self.apply_optimistic(table, FloorStatus::Available);
        }
        let report = self.settlement.settle(account, options).await?;
        self.refresh.notify_one();
        Ok(report)
    }

    pub async fn release_table(&self, table: TableNumber) -> ClientResult<CloseTableResponse> {
        self.apply_optimistic(table, FloorStatus::Available);
        let result = self.staff.release_table(table).await;
        self.refresh.notify_one();
        result
    }

    pub async fn mark_needs_cleaning(&self, table: TableNumber) -> ClientResult<Table> {
        self.apply_optimistic(table, FloorStatus::NeedsCleaning);
        let result = self.staff.mark_needs_cleaning(table).await;
        self.refresh.notify_one();
        result
    }

    pub async fn mark_cleaned(&self, table: TableNumber) -> ClientResult<Table> {
        self.apply_optimistic(table, FloorStatus::Available);
        let result = self.staff.mark_cleaned(table).await;
        self.refresh.notify_one();
        result
    }

    fn known_order(&self, order_id: &str) -> ClientResult<Order> {
        self.state().order(order_id).cloned().ok_or_else(|| {
            ClientError::Validation(format!("Order {} is not open on the floor", order_id))
        })
    }

    pub async fn dismiss_signal(&self, order_id: &str) -> ClientResult<Order> {
        let order = self.known_order(order_id)?;
        let result = self.staff.dismiss_signal(&order).await;
        self.refresh.notify_one();
        result
    }

    pub async fn advance_order(&self, order_id: &str, next: OrderStatus) -> ClientResult<Order> {
        let order = self.known_order(order_id)?;
        let result = self.staff.advance_order(&order, next).await;
        self.refresh.notify_one();
        result
    }

    /// Poll on every tick or trigger until cancelled
    ///
    /// A poll still running at cancellation is dropped, nothing is
    /// published after the token fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(restaurant = %self.restaurant, interval_ms = self.poll_interval.as_millis() as u64, "Staff console started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.refresh.notified() => {
                    ticker.reset();
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.poll_once() => {
                    if let Err(e) = result {
                        tracing::debug!(error = %e, "No floor to show yet");
                    }
                }
            }
        }
        tracing::info!(restaurant = %self.restaurant, "Staff console stopped");
    }
}
