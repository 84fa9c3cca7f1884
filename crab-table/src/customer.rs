//! Customer Table - 顾客端入口
//!
//! One object per table visit: identity, claim, ordering, the local ledger
//! and the eviction watchdog.

use crate::claim::TableClaimer;
use crate::config::EngineConfig;
use crate::error::{ClientError, ClientResult, ErrorKind};
use crate::identity::SessionIdentityProvider;
use crate::ledger::OpenOrdersLedger;
use crate::store::{RemoteStore, fetch_unpaid_orders};
use crate::submission::OrderSubmitter;
use crate::watchdog::EvictionWatchdog;
use shared::request::{CreatedOrder, OrderItemInput};
use shared::types::TableNumber;
use std::sync::Arc;
use std::time::Duration;

/// Where the customer should be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomerView {
    Ordering {
        table: TableNumber,
        session_id: String,
    },
    TableSelection {
        reason: String,
    },
}

/// Conflict and NotFound send the customer back to table selection
pub fn redirect_for(err: &ClientError) -> Option<CustomerView> {
    match err.kind() {
        ErrorKind::Conflict | ErrorKind::NotFound => Some(CustomerView::TableSelection {
            reason: err.user_message(),
        }),
        _ => None,
    }
}

/// 顾客桌台会话
pub struct CustomerTable {
    store: Arc<dyn RemoteStore>,
    identity: Arc<SessionIdentityProvider>,
    restaurant: String,
    table: TableNumber,
    session_id: String,
    submitter: OrderSubmitter,
    ledger: OpenOrdersLedger,
    poll_interval: Duration,
    page_size: u32,
}

impl CustomerTable {
    /// Resolve this device's session id for the table and claim it
    pub async fn join(
        store: Arc<dyn RemoteStore>,
        identity: Arc<SessionIdentityProvider>,
        config: &EngineConfig,
        table: TableNumber,
    ) -> ClientResult<Self> {
        let restaurant = config.restaurant.clone();
        let session_id = identity.get_or_create_session_id(&restaurant, table);

        TableClaimer::new(store.clone(), restaurant.clone(), config.claim_policy())
            .claim(table, &session_id)
            .await?;

        Ok(Self {
            submitter: OrderSubmitter::new(store.clone(), restaurant.clone(), config.submit_policy()),
            ledger: OpenOrdersLedger::new(restaurant.clone(), table),
            store,
            identity,
            restaurant,
            table,
            session_id,
            poll_interval: config.poll_interval,
            page_size: config.page_size,
        })
    }

    pub fn table(&self) -> TableNumber {
        self.table
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn view(&self) -> CustomerView {
        CustomerView::Ordering {
            table: self.table,
            session_id: self.session_id.clone(),
        }
    }

    pub fn ledger(&self) -> &OpenOrdersLedger {
        &self.ledger
    }

    pub async fn place_order(
        &self,
        items: Vec<OrderItemInput>,
        notes: Option<String>,
    ) -> ClientResult<CreatedOrder> {
        self.submitter
            .submit(self.table, &self.session_id, items, notes, Some(&self.ledger))
            .await
    }

    pub async fn call_waiter(&self) -> ClientResult<CreatedOrder> {
        self.submitter.call_waiter(self.table, &self.session_id).await
    }

    pub async fn request_payment(&self) -> ClientResult<CreatedOrder> {
        self.submitter
            .request_payment(self.table, &self.session_id)
            .await
    }

    /// Replace the ledger with the store's view; returns the active order
    /// count shown to the customer (system requests excluded)
    pub async fn refresh_ledger(&self) -> ClientResult<usize> {
        let orders = fetch_unpaid_orders(self.store.as_ref(), &self.restaurant, self.page_size).await?;
        self.ledger.supersede(&orders);
        Ok(self.ledger.len())
    }

    pub fn watchdog(&self) -> EvictionWatchdog {
        EvictionWatchdog::new(
            self.store.clone(),
            self.restaurant.clone(),
            self.table,
            self.session_id.clone(),
            self.poll_interval,
            self.page_size,
        )
    }

    /// End the visit on this device (after eviction or payment)
    pub fn leave(self) -> CustomerView {
        self.identity.forget(&self.restaurant, self.table);
        self.ledger.clear();
        tracing::info!(restaurant = %self.restaurant, table = self.table, session_id = %self.session_id, "Left table");
        CustomerView::TableSelection {
            reason: "Thanks for your visit".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::staff::StaffActions;
    use crate::store::MemoryStore;
    use crate::watchdog::EvictionCheck;
    use rust_decimal::Decimal;
    use shared::models::{OrderStatus, SystemSignal};
    use shared::request::UpdateOrderStatusRequest;

    const R: &str = "roma";

    fn setup() -> (Arc<MemoryStore>, EngineConfig) {
        let store = Arc::new(MemoryStore::new());
        store.add_tables(R, 1..=8);
        (store, EngineConfig::new("http://unused", R))
    }

    #[tokio::test]
    async fn test_rejoin_on_same_device_keeps_session() {
        let (store, config) = setup();
        let identity = Arc::new(SessionIdentityProvider::in_memory());

        let first = CustomerTable::join(store.clone(), identity.clone(), &config, 7).await.unwrap();
        let again = CustomerTable::join(store.clone(), identity.clone(), &config, 7).await.unwrap();
        assert_eq!(first.session_id(), again.session_id());
        assert_eq!(store.sessions(R).len(), 1);
    }

    #[tokio::test]
    async fn test_other_device_is_redirected() {
        let (store, config) = setup();
        let phone_a = Arc::new(SessionIdentityProvider::in_memory());
        let phone_b = Arc::new(SessionIdentityProvider::in_memory());

        CustomerTable::join(store.clone(), phone_a, &config, 7).await.unwrap();
        let err = match CustomerTable::join(store.clone(), phone_b, &config, 7).await {
            Ok(_) => panic!("second device must not share the table"),
            Err(e) => e,
        };
        assert_eq!(
            redirect_for(&err),
            Some(CustomerView::TableSelection {
                reason: "This table is occupied, please choose another table".into()
            })
        );

        let missing = match CustomerTable::join(store, Arc::new(SessionIdentityProvider::in_memory()), &config, 99).await {
            Ok(_) => panic!("unknown table"),
            Err(e) => e,
        };
        assert!(matches!(redirect_for(&missing), Some(CustomerView::TableSelection { .. })));
    }

    #[tokio::test]
    async fn test_ordering_updates_ledger_and_signals_stay_out() {
        let (store, config) = setup();
        let identity = Arc::new(SessionIdentityProvider::in_memory());
        let visit = CustomerTable::join(store.clone(), identity, &config, 3).await.unwrap();

        visit
            .place_order(vec![OrderItemInput::new("pizza", 2, Decimal::new(850, 2))], None)
            .await
            .unwrap();
        let call = visit.call_waiter().await.unwrap();
        let bill = visit.request_payment().await.unwrap();

        assert_eq!(visit.ledger().len(), 1);
        assert_eq!(visit.ledger().estimated_total(), Decimal::new(1700, 2));
        assert_eq!(visit.refresh_ledger().await.unwrap(), 1);
        assert_eq!(store.order(&call.id).unwrap().system_signal(), Some(SystemSignal::CallWaiter));
        assert_eq!(store.order(&bill.id).unwrap().system_signal(), Some(SystemSignal::RequestPayment));
    }

    #[tokio::test]
    async fn test_dismissed_call_then_release_evicts_every_party() {
        let (store, config) = setup();
        let staff = StaffActions::new(store.clone(), R, RetryPolicy::once());

        let first = CustomerTable::join(store.clone(), Arc::new(SessionIdentityProvider::in_memory()), &config, 2)
            .await
            .unwrap();
        let call = first.call_waiter().await.unwrap();
        staff.dismiss_signal(&store.order(&call.id).unwrap()).await.unwrap();
        staff.release_table(2).await.unwrap();
        assert!(matches!(first.watchdog().check().await, EvictionCheck::Evict(_)));

        let second = CustomerTable::join(store.clone(), Arc::new(SessionIdentityProvider::in_memory()), &config, 2)
            .await
            .unwrap();
        assert_ne!(second.session_id(), first.session_id());
        staff.release_table(2).await.unwrap();
        assert!(matches!(second.watchdog().check().await, EvictionCheck::Evict(_)));
    }

    #[tokio::test]
    async fn test_eviction_and_leave() {
        let (store, config) = setup();
        let identity = Arc::new(SessionIdentityProvider::in_memory());
        let visit = CustomerTable::join(store.clone(), identity.clone(), &config, 5).await.unwrap();
        let first_session = visit.session_id().to_string();

        let created = visit
            .place_order(vec![OrderItemInput::new("pasta", 1, Decimal::new(12, 0))], None)
            .await
            .unwrap();
        let watchdog = visit.watchdog();
        assert!(matches!(watchdog.check().await, EvictionCheck::Stay(_)));

        store
            .update_status(&created.id, &UpdateOrderStatusRequest::new(OrderStatus::Paid))
            .unwrap();
        store.close(R, 5).unwrap();
        assert!(matches!(watchdog.check().await, EvictionCheck::Evict(_)));

        assert!(matches!(visit.leave(), CustomerView::TableSelection { .. }));
        assert_eq!(identity.current(R, 5), None);

        let next_visit = CustomerTable::join(store, identity, &config, 5).await.unwrap();
        assert_ne!(next_visit.session_id(), first_session);
    }
}
