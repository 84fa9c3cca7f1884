//! Account Settlement Engine - 结账
//!
//! Marks every order of an account paid, then releases the table. Orders are
//! independent writes: a failure is recorded and the loop moves on, so one
//! bad order never blocks the rest. Re-running settlement on the same
//! account converges because paying a paid order is a no-op.

use crate::aggregator::{Account, AccountKey};
use crate::error::{ClientError, ClientResult};
use crate::retry::{RetryPolicy, with_retry};
use crate::store::{RemoteStore, fetch_all_tables};
use rust_decimal::prelude::*;
use shared::ErrorCode;
use shared::models::{OrderStatus, TableStatus};
use shared::request::UpdateOrderStatusRequest;
use shared::types::TableNumber;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// 2 decimal places
const DECIMAL_PLACES: u32 = 2;

/// Discount applied at settlement
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SettleOptions {
    /// Percentage of the account total (0..=100)
    pub discount_percent: Option<Decimal>,
    /// Fixed amount waived from the account total
    pub waive_amount: Option<Decimal>,
}

impl SettleOptions {
    pub fn discount_percent(percent: Decimal) -> Self {
        Self {
            discount_percent: Some(percent),
            waive_amount: None,
        }
    }

    pub fn waive(amount: Decimal) -> Self {
        Self {
            discount_percent: None,
            waive_amount: Some(amount),
        }
    }

    fn validate(&self) -> ClientResult<()> {
        if let Some(percent) = self.discount_percent
            && (percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED)
        {
            return Err(ClientError::Validation(format!(
                "Discount must be between 0 and 100%, got {}%",
                percent
            )));
        }
        if let Some(amount) = self.waive_amount
            && amount < Decimal::ZERO
        {
            return Err(ClientError::Validation(format!(
                "Waived amount cannot be negative, got {}",
                amount
            )));
        }
        Ok(())
    }

    /// Total discount for an account, capped at the account total
    pub fn discount_for(&self, total: Decimal) -> Decimal {
        let percent = self
            .discount_percent
            .map(|p| (total * p / Decimal::ONE_HUNDRED).round_dp(DECIMAL_PLACES))
            .unwrap_or_default();
        let waived = self.waive_amount.unwrap_or_default();
        (percent + waived).min(total).max(Decimal::ZERO)
    }
}

/// Split `discount` across `totals` proportionally; the last positive share
/// takes the rounding remainder so the parts add up exactly
pub fn split_discount(discount: Decimal, totals: &[Decimal]) -> Vec<Decimal> {
    let sum: Decimal = totals.iter().copied().sum();
    if discount.is_zero() || sum <= Decimal::ZERO {
        return vec![Decimal::ZERO; totals.len()];
    }

    let last_positive = totals.iter().rposition(|t| *t > Decimal::ZERO);
    let mut assigned = Decimal::ZERO;
    totals
        .iter()
        .enumerate()
        .map(|(i, total)| {
            if Some(i) == last_positive {
                discount - assigned
            } else if *total > Decimal::ZERO {
                let share = (discount * *total / sum).round_dp(DECIMAL_PLACES);
                assigned += share;
                share
            } else {
                Decimal::ZERO
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedOrder {
    pub order_id: String,
    pub error: String,
}

/// What happened to the table after the orders
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released { closed_sessions: u32 },
    /// Some orders failed, the table keeps its session
    Skipped,
    /// Account not bound to a table
    NotApplicable,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    Settled,
    /// Soft failure, settle again to converge
    PartiallySettled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SettlementReport {
    pub key: AccountKey,
    pub table: Option<TableNumber>,
    pub paid: Vec<String>,
    pub already_paid: Vec<String>,
    pub failed: Vec<FailedOrder>,
    pub discount: Decimal,
    pub release: ReleaseOutcome,
    /// The table was not yet available after the wait; a background
    /// re-check has been scheduled
    pub follow_up_scheduled: bool,
}

impl SettlementReport {
    pub fn outcome(&self) -> SettlementOutcome {
        let released = matches!(
            self.release,
            ReleaseOutcome::Released { .. } | ReleaseOutcome::NotApplicable
        );
        if self.failed.is_empty() && released {
            SettlementOutcome::Settled
        } else {
            SettlementOutcome::PartiallySettled
        }
    }
}

/// 结账引擎
#[derive(Clone)]
pub struct SettlementEngine {
    store: Arc<dyn RemoteStore>,
    restaurant: String,
    policy: RetryPolicy,
    settle_wait: Duration,
    page_size: u32,
    reconcile_trigger: Option<Arc<Notify>>,
}

impl SettlementEngine {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        restaurant: impl Into<String>,
        policy: RetryPolicy,
        settle_wait: Duration,
        page_size: u32,
    ) -> Self {
        Self {
            store,
            restaurant: restaurant.into(),
            policy,
            settle_wait,
            page_size,
            reconcile_trigger: None,
        }
    }

    /// Poke this when the follow-up re-check runs (console refresh)
    pub fn with_reconcile_trigger(mut self, trigger: Arc<Notify>) -> Self {
        self.reconcile_trigger = Some(trigger);
        self
    }

    pub async fn settle(&self, account: &Account, options: SettleOptions) -> ClientResult<SettlementReport> {
        options.validate()?;

        let discount = options.discount_for(account.total);
        let totals: Vec<Decimal> = account.orders.iter().map(|o| o.total).collect();
        let shares = split_discount(discount, &totals);

        let mut report = SettlementReport {
            key: account.key.clone(),
            table: account.table,
            paid: Vec::new(),
            already_paid: Vec::new(),
            failed: Vec::new(),
            discount,
            release: ReleaseOutcome::Skipped,
            follow_up_scheduled: false,
        };

        let regular = account.orders.iter().zip(shares.into_iter().map(Some));
        let signals = account.signal_orders.iter().map(|o| (o, None));

        for (order, share) in regular.chain(signals) {
            if order.status.is_paid() {
                report.already_paid.push(order.id.clone());
                continue;
            }

            let mut request = UpdateOrderStatusRequest::new(OrderStatus::Paid);
            request.discount = share.filter(|d| !d.is_zero());

            match self.update_status(&order.id, &request).await {
                Ok(_) => report.paid.push(order.id.clone()),
                Err(e) if e.has_code(ErrorCode::OrderAlreadyPaid) => {
                    report.already_paid.push(order.id.clone());
                }
                Err(e) => {
                    tracing::warn!(order_id = %order.id, error = %e, "Failed to mark order paid, continuing");
                    report.failed.push(FailedOrder {
                        order_id: order.id.clone(),
                        error: e.user_message(),
                    });
                }
            }
        }

        report.release = match (account.table, report.failed.is_empty()) {
            (None, _) => ReleaseOutcome::NotApplicable,
            (Some(_), false) => ReleaseOutcome::Skipped,
            (Some(table), true) => match self.close(table).await {
                Ok(closed_sessions) => ReleaseOutcome::Released { closed_sessions },
                Err(e) => {
                    tracing::warn!(table, error = %e, "Failed to release table after payment");
                    ReleaseOutcome::Failed(e.user_message())
                }
            },
        };

        if let (ReleaseOutcome::Released { .. }, Some(table)) = (&report.release, account.table) {
            report.follow_up_scheduled = self.verify_released(table).await;
        }

        tracing::info!(
            restaurant = %self.restaurant,
            key = ?report.key,
            paid = report.paid.len(),
            already_paid = report.already_paid.len(),
            failed = report.failed.len(),
            discount = %report.discount,
            outcome = ?report.outcome(),
            "Account settled"
        );
        Ok(report)
    }

    async fn update_status(&self, order_id: &str, request: &UpdateOrderStatusRequest) -> ClientResult<()> {
        let store = &self.store;
        with_retry(self.policy, "mark_paid", ClientError::is_transient, move |_| async move {
            store.update_order_status(order_id, request).await.map(|_| ())
        })
        .await
    }

    async fn close(&self, table: TableNumber) -> ClientResult<u32> {
        let store = &self.store;
        let restaurant = self.restaurant.as_str();
        with_retry(self.policy, "close_table", ClientError::is_transient, move |_| async move {
            store
                .close_table(restaurant, table)
                .await
                .map(|r| r.closed_sessions)
        })
        .await
    }

    /// Wait, re-read the table, schedule a background re-check if it is not
    /// available yet. Returns whether one was scheduled.
    async fn verify_released(&self, table: TableNumber) -> bool {
        tokio::time::sleep(self.settle_wait).await;

        match self.table_status(table).await {
            Ok(Some(TableStatus::Available)) => false,
            other => {
                tracing::info!(table, read = ?other.as_ref().map_err(|e| e.to_string()), "Table not yet available, scheduling re-check");
                self.spawn_follow_up(table);
                true
            }
        }
    }

    async fn table_status(&self, table: TableNumber) -> ClientResult<Option<TableStatus>> {
        let tables = fetch_all_tables(self.store.as_ref(), &self.restaurant, self.page_size).await?;
        Ok(tables.into_iter().find(|t| t.number == table).map(|t| t.status))
    }

    fn spawn_follow_up(&self, table: TableNumber) {
        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(engine.settle_wait).await;
            match engine.table_status(table).await {
                Ok(Some(TableStatus::Available)) => {
                    tracing::debug!(table, "Table released");
                }
                other => {
                    tracing::warn!(table, read = ?other.map_err(|e| e.to_string()), "Table still not available after settlement");
                }
            }
            if let Some(trigger) = &engine.reconcile_trigger {
                trigger.notify_one();
            }
        });
    }
}
