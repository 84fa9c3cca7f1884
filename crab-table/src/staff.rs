//! Staff-side table and order actions
//!
//! Release without payment, cleaning round-trip, dismissing customer
//! signals and moving orders along the kitchen flow.

use crate::error::{ClientError, ClientResult};
use crate::retry::{RetryPolicy, with_retry};
use crate::store::{RemoteStore, fetch_unpaid_orders};
use shared::AppError;
use shared::ErrorCode;
use shared::models::{Order, OrderStatus, Table, TableStatus};
use shared::request::{CloseTableResponse, UpdateOrderStatusRequest};
use shared::types::TableNumber;
use std::sync::Arc;

const DEFAULT_PAGE_SIZE: u32 = 50;

#[derive(Clone)]
pub struct StaffActions {
    store: Arc<dyn RemoteStore>,
    restaurant: String,
    policy: RetryPolicy,
    page_size: u32,
}

impl StaffActions {
    pub fn new(store: Arc<dyn RemoteStore>, restaurant: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            store,
            restaurant: restaurant.into(),
            policy,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Close every open session and free the table
    ///
    /// Regular orders are untouched. Call-waiter / payment requests left on
    /// the table are marked paid afterwards so they do not outlive the
    /// visit; that sweep is best effort and never fails the release.
    pub async fn release_table(&self, table: TableNumber) -> ClientResult<CloseTableResponse> {
        let store = &self.store;
        let restaurant = self.restaurant.as_str();
        let response = with_retry(self.policy, "release_table", ClientError::is_transient, move |_| {
            store.close_table(restaurant, table)
        })
        .await?;
        tracing::info!(restaurant, table, closed_sessions = response.closed_sessions, "Table released");

        match self.clear_signals(table).await {
            Ok(0) => {}
            Ok(cleared) => tracing::info!(restaurant, table, cleared, "Leftover customer requests closed"),
            Err(e) => tracing::warn!(restaurant, table, error = %e, "Could not close leftover customer requests"),
        }
        Ok(response)
    }

    /// Mark every unpaid system order of `table` paid; returns how many
    async fn clear_signals(&self, table: TableNumber) -> ClientResult<usize> {
        let orders = fetch_unpaid_orders(self.store.as_ref(), &self.restaurant, self.page_size).await?;
        let request = UpdateOrderStatusRequest::new(OrderStatus::Paid);
        let mut cleared = 0;
        for order in orders
            .iter()
            .filter(|o| o.is_system() && !o.status.is_settled() && o.table() == Some(table))
        {
            self.update_status(&order.id, &request).await?;
            cleared += 1;
        }
        Ok(cleared)
    }

    async fn update_status(&self, order_id: &str, request: &UpdateOrderStatusRequest) -> ClientResult<Order> {
        let store = &self.store;
        with_retry(self.policy, "update_order_status", ClientError::is_transient, move |_| {
            store.update_order_status(order_id, request)
        })
        .await
    }

    pub async fn mark_needs_cleaning(&self, table: TableNumber) -> ClientResult<Table> {
        self.set_status(table, TableStatus::NeedsCleaning).await
    }

    pub async fn mark_cleaned(&self, table: TableNumber) -> ClientResult<Table> {
        self.set_status(table, TableStatus::Available).await
    }

    async fn set_status(&self, table: TableNumber, status: TableStatus) -> ClientResult<Table> {
        let store = &self.store;
        let restaurant = self.restaurant.as_str();
        let updated = with_retry(self.policy, "set_table_status", ClientError::is_transient, move |_| {
            store.set_table_status(restaurant, table, status)
        })
        .await?;
        tracing::info!(restaurant, table, status = %updated.status, "Table status set");
        Ok(updated)
    }

    /// Acknowledge a call-waiter / request-payment order
    pub async fn dismiss_signal(&self, order: &Order) -> ClientResult<Order> {
        if !order.is_system() {
            return Err(ClientError::Validation(format!(
                "Order {} is not a customer request",
                order.id
            )));
        }
        self.advance_order(order, OrderStatus::Served).await
    }

    /// Forward-only status change, checked locally before any I/O
    pub async fn advance_order(&self, order: &Order, next: OrderStatus) -> ClientResult<Order> {
        if !order.status.can_transition_to(next) {
            let code = if order.status.is_paid() {
                ErrorCode::OrderAlreadyPaid
            } else {
                ErrorCode::OrderInvalidTransition
            };
            return Err(AppError::with_message(
                code,
                format!("Order {} cannot move from {} to {}", order.id, order.status, next),
            )
            .into());
        }

        let updated = self
            .update_status(&order.id, &UpdateOrderStatusRequest::new(next))
            .await?;
        tracing::info!(order_id = %order.id, from = %order.status, to = %updated.status, "Order advanced");
        Ok(updated)
    }
}
