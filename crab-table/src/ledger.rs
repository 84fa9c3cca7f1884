//! Open-orders ledger
//!
//! Local, fast estimate of what a customer has ordered at one table. Owned
//! by the customer view; every poll replaces it with the store's answer.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use shared::models::Order;
use shared::types::{TableNumber, Timestamp};
use shared::util::now_millis;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub order_id: String,
    pub total: Decimal,
    pub recorded_at: Timestamp,
}

/// 本地未结订单账本，按 (restaurant, table) 划分
#[derive(Debug)]
pub struct OpenOrdersLedger {
    restaurant: String,
    table: TableNumber,
    entries: Mutex<Vec<LedgerEntry>>,
}

impl OpenOrdersLedger {
    pub fn new(restaurant: impl Into<String>, table: TableNumber) -> Self {
        Self {
            restaurant: restaurant.into(),
            table,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn restaurant(&self) -> &str {
        &self.restaurant
    }

    pub fn table(&self) -> TableNumber {
        self.table
    }

    /// Record a freshly created order; a repeated id is ignored
    pub fn record(&self, order_id: impl Into<String>, total: Decimal) {
        let order_id = order_id.into();
        let mut entries = self.entries.lock();
        if entries.iter().any(|e| e.order_id == order_id) {
            return;
        }
        entries.push(LedgerEntry {
            order_id,
            total,
            recorded_at: now_millis(),
        });
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn estimated_total(&self) -> Decimal {
        self.entries.lock().iter().map(|e| e.total).sum()
    }

    /// Replace the estimate with the polled non-settled regular orders of
    /// this table
    pub fn supersede(&self, orders: &[Order]) {
        let mut entries = self.entries.lock();
        *entries = orders
            .iter()
            .filter(|o| o.table() == Some(self.table) && !o.is_system() && !o.status.is_settled())
            .map(|o| LedgerEntry {
                order_id: o.id.clone(),
                total: o.total,
                recorded_at: o.created_at,
            })
            .collect();
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{OrderStatus, SessionRef};

    fn order(id: &str, table: TableNumber, status: OrderStatus, total: i64) -> Order {
        Order {
            id: id.to_string(),
            status,
            total: Decimal::new(total, 0),
            created_at: 1,
            updated_at: 1,
            notes: None,
            items: vec![],
            table_session: Some(SessionRef {
                session_id: Some("s1".into()),
                table: Some(table),
            }),
            discount: None,
        }
    }

    #[test]
    fn test_record_is_idempotent_per_order() {
        let ledger = OpenOrdersLedger::new("roma", 4);
        ledger.record("o1", Decimal::new(1250, 2));
        ledger.record("o1", Decimal::new(1250, 2));
        ledger.record("o2", Decimal::new(500, 2));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.estimated_total(), Decimal::new(1750, 2));
    }

    #[test]
    fn test_poll_supersedes_local_estimate() {
        let ledger = OpenOrdersLedger::new("roma", 4);
        ledger.record("local-only", Decimal::new(9, 0));

        ledger.supersede(&[
            order("o1", 4, OrderStatus::Preparing, 500),
            order("o2", 4, OrderStatus::Paid, 300),
            order("o3", 5, OrderStatus::Pending, 70),
        ]);

        let ids: Vec<_> = ledger.entries().into_iter().map(|e| e.order_id).collect();
        assert_eq!(ids, vec!["o1".to_string()]);
        assert_eq!(ledger.estimated_total(), Decimal::new(500, 0));
    }
}
