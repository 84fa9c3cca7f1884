//! Order Submission Pipeline - 下单
//!
//! Cart → persisted order. Validation happens before any I/O. The only
//! error retried here is the store's "session has no associated table"
//! answer, which shows up right after a claim while the session write is
//! still propagating. Network failures are surfaced instead: a create whose
//! response was lost may already exist on the store.

use crate::error::{ClientError, ClientResult};
use crate::ledger::OpenOrdersLedger;
use crate::retry::{RetryPolicy, with_retry};
use crate::store::RemoteStore;
use rust_decimal::Decimal;
use shared::ErrorCode;
use shared::models::SystemSignal;
use shared::request::{CreateOrderRequest, CreatedOrder, OrderItemInput};
use shared::types::TableNumber;
use std::sync::Arc;

/// Local checks; returns the order total
pub fn validate_order(session_id: &str, items: &[OrderItemInput]) -> ClientResult<Decimal> {
    if session_id.trim().is_empty() {
        return Err(ClientError::Validation(
            "Your table session has not started yet, please scan the table code again".into(),
        ));
    }
    if items.is_empty() {
        return Err(ClientError::Validation("Your cart is empty".into()));
    }
    if let Some(item) = items.iter().find(|i| i.quantity == 0) {
        return Err(ClientError::Validation(format!(
            "Quantity of {} must be at least 1",
            item.name.as_deref().unwrap_or(&item.product_id)
        )));
    }
    if items.iter().any(|i| i.unit_price < Decimal::ZERO) {
        return Err(ClientError::Validation("Prices cannot be negative".into()));
    }

    let total: Decimal = items.iter().map(OrderItemInput::line_total).sum();
    let is_system = items
        .iter()
        .all(|i| SystemSignal::from_product_id(&i.product_id).is_some());

    if is_system {
        if !total.is_zero() {
            return Err(ClientError::Validation(
                "System requests cannot carry an amount".into(),
            ));
        }
    } else if total <= Decimal::ZERO {
        return Err(ClientError::Validation(
            "The order total must be greater than zero".into(),
        ));
    }

    Ok(total)
}

fn is_session_lag(e: &ClientError) -> bool {
    e.has_code(ErrorCode::SessionWithoutTable)
}

/// 下单管道
#[derive(Clone)]
pub struct OrderSubmitter {
    store: Arc<dyn RemoteStore>,
    restaurant: String,
    policy: RetryPolicy,
}

impl OrderSubmitter {
    pub fn new(store: Arc<dyn RemoteStore>, restaurant: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            store,
            restaurant: restaurant.into(),
            policy,
        }
    }

    /// Validate and create the order; regular orders are recorded in
    /// `ledger` on success
    ///
    /// Only "session has no associated table" is retried. A network failure
    /// is returned after one attempt even though it is transient: the create
    /// request carries no idempotency key, so the order may already exist on
    /// the store. The caller resubmits after the next poll shows it missing.
    pub async fn submit(
        &self,
        table: TableNumber,
        session_id: &str,
        items: Vec<OrderItemInput>,
        notes: Option<String>,
        ledger: Option<&OpenOrdersLedger>,
    ) -> ClientResult<CreatedOrder> {
        validate_order(session_id, &items)?;

        let is_system = items
            .iter()
            .all(|i| SystemSignal::from_product_id(&i.product_id).is_some());
        let request = CreateOrderRequest {
            table,
            session_id: session_id.to_string(),
            items,
            notes,
        };

        let store = &self.store;
        let restaurant = self.restaurant.as_str();
        let request_ref = &request;
        let created = with_retry(self.policy, "create_order", is_session_lag, move |attempt| async move {
            if attempt > 1 {
                tracing::debug!(table, attempt, "Session not yet bound to table, resubmitting");
            }
            store.create_order(restaurant, request_ref).await
        })
        .await
        .inspect_err(|e| {
            tracing::warn!(restaurant, table, session_id, error = %e, "Order submission failed");
        })?;

        tracing::info!(
            restaurant,
            table,
            session_id,
            order_id = %created.id,
            total = %created.total,
            system = is_system,
            "Order submitted"
        );

        if !is_system && let Some(ledger) = ledger {
            ledger.record(created.id.clone(), created.total);
        }
        Ok(created)
    }

    async fn submit_signal(
        &self,
        table: TableNumber,
        session_id: &str,
        signal: SystemSignal,
    ) -> ClientResult<CreatedOrder> {
        let mut item = OrderItemInput::new(signal.product_id(), 1, Decimal::ZERO);
        item.name = Some(signal.label().to_string());
        self.submit(table, session_id, vec![item], None, None).await
    }

    /// 呼叫服务员
    pub async fn call_waiter(&self, table: TableNumber, session_id: &str) -> ClientResult<CreatedOrder> {
        self.submit_signal(table, session_id, SystemSignal::CallWaiter)
            .await
    }

    /// 请求结账
    pub async fn request_payment(
        &self,
        table: TableNumber,
        session_id: &str,
    ) -> ClientResult<CreatedOrder> {
        self.submit_signal(table, session_id, SystemSignal::RequestPayment)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::MemoryStore;
    use shared::models::{OrderStatus, SYS_WAITER_CALL};
    use std::time::Duration;

    const R: &str = "roma";

    fn setup() -> (Arc<MemoryStore>, OrderSubmitter) {
        let store = Arc::new(MemoryStore::new());
        store.add_tables(R, 1..=10);
        store.claim(R, 2, "s1").unwrap();
        let submitter = OrderSubmitter::new(
            store.clone(),
            R,
            RetryPolicy::new(3, Duration::from_millis(500)),
        );
        (store, submitter)
    }

    fn pizza() -> OrderItemInput {
        OrderItemInput::new("pizza", 2, Decimal::new(950, 2))
    }

    #[test]
    fn test_validation_rules() {
        assert!(validate_order("", &[pizza()]).is_err());
        assert!(validate_order("s1", &[]).is_err());
        assert!(validate_order("s1", &[OrderItemInput::new("pizza", 0, Decimal::ONE)]).is_err());
        assert!(validate_order("s1", &[OrderItemInput::new("pizza", 1, Decimal::NEGATIVE_ONE)]).is_err());
        assert_eq!(validate_order("s1", &[pizza()]).unwrap(), Decimal::new(1900, 2));
    }

    #[test]
    fn test_zero_total_only_for_system_orders() {
        let free = OrderItemInput::new("water", 1, Decimal::ZERO);
        let err = validate_order("s1", &[free]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let call = OrderItemInput::new(SYS_WAITER_CALL, 1, Decimal::ZERO);
        assert_eq!(validate_order("s1", &[call]).unwrap(), Decimal::ZERO);

        let priced_call = OrderItemInput::new(SYS_WAITER_CALL, 1, Decimal::ONE);
        assert!(validate_order("s1", &[priced_call]).is_err());
    }

    #[tokio::test]
    async fn test_zero_total_order_never_reaches_the_store() {
        let (store, submitter) = setup();
        let free = OrderItemInput::new("water", 1, Decimal::ZERO);

        let err = submitter.submit(2, "s1", vec![free], None, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(store.orders(R).is_empty());
    }

    #[tokio::test]
    async fn test_call_waiter_is_accepted() {
        let (store, submitter) = setup();
        let ledger = OpenOrdersLedger::new(R, 2);

        let created = submitter.call_waiter(2, "s1").await.unwrap();
        assert_eq!(created.total, Decimal::ZERO);

        let order = store.order(&created.id).unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.is_system());
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_successful_submit_is_recorded_in_ledger() {
        let (_, submitter) = setup();
        let ledger = OpenOrdersLedger::new(R, 2);

        let created = submitter
            .submit(2, "s1", vec![pizza()], Some("no onions".into()), Some(&ledger))
            .await
            .unwrap();
        assert_eq!(created.total, Decimal::new(1900, 2));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.entries()[0].order_id, created.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_lag_is_retried() {
        let (store, submitter) = setup();
        store.inject(|f| f.session_lag = 2);

        let created = submitter.submit(2, "s1", vec![pizza()], None, None).await.unwrap();
        assert!(store.order(&created.id).is_some());
        assert_eq!(store.orders(R).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_lag_gives_up_after_three_attempts() {
        let (store, submitter) = setup();
        store.inject(|f| f.session_lag = 3);

        let err = submitter.submit(2, "s1", vec![pizza()], None, None).await.unwrap_err();
        assert!(err.has_code(ErrorCode::SessionWithoutTable));
        assert_eq!(err.user_message(), "Could not reach the counter, retrying…");
        assert!(store.orders(R).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_on_create_is_not_resubmitted() {
        let (store, submitter) = setup();
        let ledger = OpenOrdersLedger::new(R, 2);
        store.inject(|f| f.create_failures = 1);

        let err = submitter
            .submit(2, "s1", vec![pizza()], None, Some(&ledger))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(err.has_code(ErrorCode::NetworkError));
        assert!(store.orders(R).is_empty());
        assert!(ledger.is_empty());

        submitter.submit(2, "s1", vec![pizza()], None, Some(&ledger)).await.unwrap();
        assert_eq!(store.orders(R).len(), 1);
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_session_not_on_table_is_conflict() {
        let (_, submitter) = setup();
        let err = submitter.submit(3, "s1", vec![pizza()], None, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
