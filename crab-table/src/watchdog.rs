//! Eviction Watchdog - 顾客端被清台检测
//!
//! Runs while a customer holds a table. Eviction needs two agreeing reads:
//! the reconciled status is available, and a separate read finds no
//! non-settled order for the table or the session. A failed read never
//! evicts.

use crate::error::ClientResult;
use crate::reconciler::{FloorStatus, TableSignals, status_of};
use crate::snapshot::fetch_snapshot;
use crate::store::{RemoteStore, fetch_unpaid_orders};
use shared::models::{Order, OrderStatus, TableSession};
use shared::types::{TableNumber, Timestamp};
use shared::util::now_millis;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// The table was freed under the customer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eviction {
    pub table: TableNumber,
    pub session_id: String,
    pub detected_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictionCheck {
    Stay(FloorStatus),
    Evict(Eviction),
    /// A read failed; nothing is concluded
    Unknown,
}

/// 清台检测
#[derive(Clone)]
pub struct EvictionWatchdog {
    store: Arc<dyn RemoteStore>,
    restaurant: String,
    table: TableNumber,
    session_id: String,
    interval: Duration,
    page_size: u32,
}

impl EvictionWatchdog {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        restaurant: impl Into<String>,
        table: TableNumber,
        session_id: impl Into<String>,
        interval: Duration,
        page_size: u32,
    ) -> Self {
        Self {
            store,
            restaurant: restaurant.into(),
            table,
            session_id: session_id.into(),
            interval,
            page_size,
        }
    }

    fn belongs_here(&self, order: &Order, sessions: &[TableSession]) -> bool {
        if order.status.is_settled() {
            return false;
        }
        if order.table() == Some(self.table) || order.session_id() == Some(self.session_id.as_str()) {
            return true;
        }
        // Table only reachable through the order's session
        order.table().is_none()
            && order.session_id().is_some_and(|id| {
                sessions
                    .iter()
                    .any(|s| s.id == id && s.table == Some(self.table))
            })
    }

    async fn derive_status(&self) -> ClientResult<FloorStatus> {
        let snapshot = fetch_snapshot(self.store.as_ref(), &self.restaurant, self.page_size).await?;
        let sessions: Vec<TableSession> = snapshot
            .sessions
            .iter()
            .filter(|s| s.table == Some(self.table))
            .cloned()
            .collect();
        let orders: Vec<Order> = snapshot
            .orders
            .iter()
            .filter(|o| self.belongs_here(o, &snapshot.sessions))
            .cloned()
            .collect();

        Ok(status_of(
            self.table,
            &TableSignals {
                explicit_status: snapshot.table(self.table).map(|t| t.status),
                open_sessions: &sessions,
                active_orders: &orders,
            },
        ))
    }

    /// Unpaid orders that keep the customer here. A dismissed (served)
    /// call-waiter or payment request does not: it carries no money and
    /// staff already answered it.
    async fn has_active_orders(&self) -> ClientResult<bool> {
        let orders = fetch_unpaid_orders(self.store.as_ref(), &self.restaurant, self.page_size).await?;
        Ok(orders
            .iter()
            .filter(|o| !o.is_system() || matches!(o.status, OrderStatus::Pending | OrderStatus::Preparing))
            .any(|o| self.belongs_here(o, &[])))
    }

    /// One evaluation
    pub async fn check(&self) -> EvictionCheck {
        let status = match self.derive_status().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(table = self.table, error = %e, "Watchdog status read failed");
                return EvictionCheck::Unknown;
            }
        };
        if !status.is_available() {
            return EvictionCheck::Stay(status);
        }

        match self.has_active_orders().await {
            Ok(true) => {
                tracing::debug!(table = self.table, "Table reads available but orders are still open");
                EvictionCheck::Stay(status)
            }
            Ok(false) => EvictionCheck::Evict(Eviction {
                table: self.table,
                session_id: self.session_id.clone(),
                detected_at: now_millis(),
            }),
            Err(e) => {
                tracing::warn!(table = self.table, error = %e, "Watchdog order read failed");
                EvictionCheck::Unknown
            }
        }
    }

    /// Check on every tick until evicted or cancelled
    ///
    /// Returns `None` on cancellation; an in-flight check is dropped.
    pub async fn run(self, cancel: CancellationToken) -> Option<Eviction> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(table = self.table, session_id = %self.session_id, "Eviction watchdog started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(table = self.table, "Eviction watchdog stopped");
                    return None;
                }
                _ = ticker.tick() => {}
            }

            let check = tokio::select! {
                _ = cancel.cancelled() => return None,
                check = self.check() => check,
            };

            if let EvictionCheck::Evict(eviction) = check {
                tracing::info!(
                    table = self.table,
                    session_id = %self.session_id,
                    "Table was released by staff, leaving"
                );
                return Some(eviction);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;
    use shared::models::{OrderStatus, SYS_WAITER_CALL, SessionRef, TableStatus};
    use shared::request::{CreateOrderRequest, OrderItemInput, UpdateOrderStatusRequest};

    const R: &str = "roma";

    fn setup() -> (Arc<MemoryStore>, EvictionWatchdog) {
        let store = Arc::new(MemoryStore::new());
        store.add_tables(R, 1..=3);
        store.claim(R, 2, "s1").unwrap();
        let watchdog = EvictionWatchdog::new(store.clone(), R, 2, "s1", Duration::from_secs(5), 50);
        (store, watchdog)
    }

    fn place(store: &MemoryStore) -> String {
        store
            .create_order(
                R,
                &CreateOrderRequest {
                    table: 2,
                    session_id: "s1".into(),
                    items: vec![OrderItemInput::new("pizza", 1, Decimal::TEN)],
                    notes: None,
                },
            )
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_claimed_table_stays() {
        let (store, watchdog) = setup();
        assert_eq!(
            watchdog.check().await,
            EvictionCheck::Stay(FloorStatus::Occupied {
                awaiting_payment: false
            })
        );
        place(&store);
        assert!(matches!(watchdog.check().await, EvictionCheck::Stay(_)));
    }

    #[tokio::test]
    async fn test_settled_table_evicts() {
        let (store, watchdog) = setup();
        let id = place(&store);
        store
            .update_status(&id, &UpdateOrderStatusRequest::new(OrderStatus::Paid))
            .unwrap();
        store.close(R, 2).unwrap();

        match watchdog.check().await {
            EvictionCheck::Evict(eviction) => {
                assert_eq!(eviction.table, 2);
                assert_eq!(eviction.session_id, "s1");
            }
            other => panic!("expected eviction, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_open_order_of_session_blocks_eviction() {
        let (store, watchdog) = setup();
        store.close(R, 2).unwrap();
        // Order still open under our session, its table no longer resolvable
        store.insert_order(
            R,
            Order {
                id: "late".into(),
                status: OrderStatus::Preparing,
                total: Decimal::TEN,
                created_at: 0,
                updated_at: 0,
                notes: None,
                items: vec![],
                table_session: Some(SessionRef {
                    session_id: Some("s1".into()),
                    table: None,
                }),
                discount: None,
            },
        );

        assert!(matches!(watchdog.check().await, EvictionCheck::Stay(_)));
    }

    fn call_waiter(store: &MemoryStore, session_id: &str) -> String {
        store
            .create_order(
                R,
                &CreateOrderRequest {
                    table: 2,
                    session_id: session_id.into(),
                    items: vec![OrderItemInput::new(SYS_WAITER_CALL, 1, Decimal::ZERO)],
                    notes: None,
                },
            )
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_dismissed_call_does_not_pin_the_table() {
        let (store, watchdog) = setup();
        let call = call_waiter(&store, "s1");
        store
            .update_status(&call, &UpdateOrderStatusRequest::new(OrderStatus::Served))
            .unwrap();
        store.close(R, 2).unwrap();
        assert!(matches!(watchdog.check().await, EvictionCheck::Evict(_)));

        // The next party at the same table is not held by the old call either
        store.claim(R, 2, "s2").unwrap();
        store.close(R, 2).unwrap();
        let next = EvictionWatchdog::new(store.clone(), R, 2, "s2", Duration::from_secs(5), 50);
        assert!(matches!(next.check().await, EvictionCheck::Evict(_)));
        assert_eq!(store.order(&call).unwrap().status, OrderStatus::Served);
    }

    #[tokio::test]
    async fn test_unanswered_call_keeps_customer() {
        let (store, watchdog) = setup();
        call_waiter(&store, "s1");
        store.close(R, 2).unwrap();
        assert!(matches!(watchdog.check().await, EvictionCheck::Stay(FloorStatus::SystemCall(_))));
    }

    #[tokio::test]
    async fn test_read_failure_never_evicts() {
        let (store, watchdog) = setup();
        store.close(R, 2).unwrap();
        store.inject(|f| f.list_failures = 1);
        assert_eq!(watchdog.check().await, EvictionCheck::Unknown);
    }

    #[tokio::test]
    async fn test_explicit_occupied_without_orders_stays() {
        let (store, watchdog) = setup();
        store.set_status(R, 2, TableStatus::Occupied).unwrap();
        assert!(matches!(watchdog.check().await, EvictionCheck::Stay(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_evicts_after_release() {
        let (store, watchdog) = setup();
        let handle = tokio::spawn(watchdog.run(CancellationToken::new()));

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(!handle.is_finished());

        store.close(R, 2).unwrap();
        let eviction = tokio::time::timeout(Duration::from_secs(30), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(eviction.map(|e| e.table), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let (_, watchdog) = setup();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watchdog.run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(7)).await;
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), None);
    }
}
