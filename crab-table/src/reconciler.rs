//! Table Status Reconciler
//!
//! Folds three signals into one status per table:
//!
//! 1. pending system call (call-waiter / request-payment)
//! 2. explicit `needs_cleaning`
//! 3. active regular order → occupied (awaiting payment once all served)
//! 4. otherwise the explicit status; an open session alone never forces
//!    occupied
//! 5. available
//!
//! Everything here is pure: every observer derives the same floor from the
//! same read.

use crate::aggregator::resolve_table;
use rust_decimal::Decimal;
use shared::models::{Order, OrderStatus, SystemSignal, Table, TableSession, TableStatus};
use shared::types::TableNumber;
use std::collections::{BTreeMap, HashMap};

/// Authoritative status of one table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloorStatus {
    SystemCall(SystemSignal),
    NeedsCleaning,
    Occupied { awaiting_payment: bool },
    Available,
}

impl FloorStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SystemCall(signal) => signal.label(),
            Self::NeedsCleaning => "Needs cleaning",
            Self::Occupied {
                awaiting_payment: true,
            } => "Awaiting payment",
            Self::Occupied {
                awaiting_payment: false,
            } => "Occupied",
            Self::Available => "Available",
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

impl std::fmt::Display for FloorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Inputs of [`status_of`] for one table
#[derive(Debug, Clone, Copy, Default)]
pub struct TableSignals<'a> {
    /// Stored table status; `None` when the table row is unknown
    pub explicit_status: Option<TableStatus>,
    /// Open sessions bound to the table. Informational: they do not make
    /// the table occupied on their own.
    pub open_sessions: &'a [TableSession],
    /// Orders of the table as returned by the store (settled ones ignored)
    pub active_orders: &'a [Order],
}

/// Derive the table status from its signals
pub fn status_of(table: TableNumber, signals: &TableSignals<'_>) -> FloorStatus {
    let active = signals
        .active_orders
        .iter()
        .filter(|o| !o.status.is_settled())
        .filter(|o| o.table().is_none_or(|t| t == table));

    let mut pending_signal = None;
    let mut regular_orders = 0usize;
    let mut all_served = true;

    for order in active {
        match order.system_signal() {
            Some(signal) => {
                if matches!(order.status, OrderStatus::Pending | OrderStatus::Preparing)
                    && pending_signal != Some(SystemSignal::RequestPayment)
                {
                    pending_signal = Some(signal);
                }
            }
            None => {
                regular_orders += 1;
                all_served &= order.status == OrderStatus::Served;
            }
        }
    }

    if let Some(signal) = pending_signal {
        return FloorStatus::SystemCall(signal);
    }
    if signals.explicit_status == Some(TableStatus::NeedsCleaning) {
        return FloorStatus::NeedsCleaning;
    }
    if regular_orders > 0 {
        return FloorStatus::Occupied {
            awaiting_payment: all_served,
        };
    }
    match signals.explicit_status {
        Some(TableStatus::Occupied) => FloorStatus::Occupied {
            awaiting_payment: false,
        },
        _ => FloorStatus::Available,
    }
}

/// One table on the floor
#[derive(Debug, Clone, PartialEq)]
pub struct FloorEntry {
    pub table: TableNumber,
    pub name: Option<String>,
    pub status: FloorStatus,
    pub explicit_status: TableStatus,
    pub open_sessions: Vec<String>,
    /// Non-settled regular orders
    pub active_orders: usize,
    pub total: Decimal,
}

/// Inconsistencies tolerated and surfaced rather than assumed away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FloorAnomaly {
    /// More than one open session on a table
    DuplicateOpenSessions {
        table: TableNumber,
        session_ids: Vec<String>,
    },
    /// Active orders whose table cannot be recovered
    OrphanOrders { order_ids: Vec<String> },
    /// Active orders pointing at a table the store did not list
    UnknownTable {
        table: TableNumber,
        order_ids: Vec<String>,
    },
    /// Open session on a table explicitly available and without active orders
    StaleSession {
        table: TableNumber,
        session_id: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FloorView {
    pub entries: BTreeMap<TableNumber, FloorEntry>,
    pub anomalies: Vec<FloorAnomaly>,
}

impl FloorView {
    pub fn status(&self, table: TableNumber) -> Option<FloorStatus> {
        self.entries.get(&table).map(|e| e.status)
    }

    pub fn entry(&self, table: TableNumber) -> Option<&FloorEntry> {
        self.entries.get(&table)
    }
}

/// Reconcile every listed table
pub fn reconcile_floor(tables: &[Table], sessions: &[TableSession], orders: &[Order]) -> FloorView {
    let open: Vec<&TableSession> = sessions.iter().filter(|s| s.is_open()).collect();
    let session_tables: HashMap<&str, TableNumber> = open
        .iter()
        .filter_map(|s| s.table.map(|t| (s.id.as_str(), t)))
        .collect();

    let mut orders_by_table: BTreeMap<TableNumber, Vec<Order>> = BTreeMap::new();
    let mut orphans = Vec::new();
    for order in orders.iter().filter(|o| !o.status.is_settled()) {
        match resolve_table(order, &session_tables) {
            Some(table) => orders_by_table.entry(table).or_default().push(order.clone()),
            None => orphans.push(order.id.clone()),
        }
    }

    let mut sessions_by_table: BTreeMap<TableNumber, Vec<TableSession>> = BTreeMap::new();
    for session in &open {
        if let Some(table) = session.table {
            sessions_by_table.entry(table).or_default().push((*session).clone());
        }
    }

    let mut view = FloorView::default();
    let no_orders: Vec<Order> = Vec::new();
    let no_sessions: Vec<TableSession> = Vec::new();

    for table in tables {
        let table_orders = orders_by_table.get(&table.number).unwrap_or(&no_orders);
        let table_sessions = sessions_by_table.get(&table.number).unwrap_or(&no_sessions);

        let status = status_of(
            table.number,
            &TableSignals {
                explicit_status: Some(table.status),
                open_sessions: table_sessions,
                active_orders: table_orders,
            },
        );

        let regular: Vec<&Order> = table_orders.iter().filter(|o| !o.is_system()).collect();

        if table_sessions.len() > 1 {
            view.anomalies.push(FloorAnomaly::DuplicateOpenSessions {
                table: table.number,
                session_ids: table_sessions.iter().map(|s| s.id.clone()).collect(),
            });
        }
        if regular.is_empty() && table.status == TableStatus::Available {
            for session in table_sessions {
                view.anomalies.push(FloorAnomaly::StaleSession {
                    table: table.number,
                    session_id: session.id.clone(),
                });
            }
        }

        view.entries.insert(
            table.number,
            FloorEntry {
                table: table.number,
                name: table.name.clone(),
                status,
                explicit_status: table.status,
                open_sessions: table_sessions.iter().map(|s| s.id.clone()).collect(),
                active_orders: regular.len(),
                total: regular.iter().map(|o| o.total).sum(),
            },
        );
    }

    for (table, table_orders) in &orders_by_table {
        if !view.entries.contains_key(table) {
            view.anomalies.push(FloorAnomaly::UnknownTable {
                table: *table,
                order_ids: table_orders.iter().map(|o| o.id.clone()).collect(),
            });
        }
    }
    if !orphans.is_empty() {
        view.anomalies.push(FloorAnomaly::OrphanOrders { order_ids: orphans });
    }

    for anomaly in &view.anomalies {
        tracing::debug!(?anomaly, "Floor anomaly");
    }
    view
}

/// A table whose entry changed between two floor views
#[derive(Debug, Clone, PartialEq)]
pub struct FloorChange {
    pub table: TableNumber,
    pub before: Option<FloorEntry>,
    pub after: Option<FloorEntry>,
}

/// Minimal set of changed tables
pub fn diff(prev: &FloorView, next: &FloorView) -> Vec<FloorChange> {
    let mut changes = Vec::new();

    for (table, entry) in &next.entries {
        let before = prev.entries.get(table);
        if before != Some(entry) {
            changes.push(FloorChange {
                table: *table,
                before: before.cloned(),
                after: Some(entry.clone()),
            });
        }
    }
    for (table, entry) in &prev.entries {
        if !next.entries.contains_key(table) {
            changes.push(FloorChange {
                table: *table,
                before: Some(entry.clone()),
                after: None,
            });
        }
    }

    changes.sort_by_key(|c| c.table);
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{OrderItem, SYS_PAYMENT_REQUEST, SYS_WAITER_CALL, SessionRef};

    fn order(id: &str, table: TableNumber, product_id: &str, status: OrderStatus, total: i64) -> Order {
        Order {
            id: id.to_string(),
            status,
            total: Decimal::new(total, 0),
            created_at: 0,
            updated_at: 0,
            notes: None,
            items: vec![OrderItem {
                product_id: product_id.to_string(),
                name: None,
                quantity: 1,
                unit_price: Decimal::new(total, 0),
                notes: None,
            }],
            table_session: Some(SessionRef {
                session_id: Some(format!("s{}", table)),
                table: Some(table),
            }),
            discount: None,
        }
    }

    #[test]
    fn test_precedence_over_every_combination() {
        let explicit = [
            TableStatus::Available,
            TableStatus::Occupied,
            TableStatus::NeedsCleaning,
        ];
        let session = [TableSession::open("s1", 1, 0)];

        for system_pending in [false, true] {
            for status in explicit {
                for has_regular in [false, true] {
                    for with_session in [false, true] {
                        let mut orders = Vec::new();
                        if system_pending {
                            orders.push(order("sys", 1, SYS_WAITER_CALL, OrderStatus::Pending, 0));
                        }
                        if has_regular {
                            orders.push(order("o1", 1, "pizza", OrderStatus::Preparing, 20));
                        }
                        let signals = TableSignals {
                            explicit_status: Some(status),
                            open_sessions: if with_session { &session[..] } else { &[] },
                            active_orders: &orders,
                        };

                        let expected = if system_pending {
                            FloorStatus::SystemCall(SystemSignal::CallWaiter)
                        } else if status == TableStatus::NeedsCleaning {
                            FloorStatus::NeedsCleaning
                        } else if has_regular || status == TableStatus::Occupied {
                            FloorStatus::Occupied {
                                awaiting_payment: false,
                            }
                        } else {
                            FloorStatus::Available
                        };

                        assert_eq!(
                            status_of(1, &signals),
                            expected,
                            "system={} explicit={} regular={} session={}",
                            system_pending,
                            status,
                            has_regular,
                            with_session
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_awaiting_payment_once_everything_is_served() {
        let orders = vec![
            order("o1", 1, "pizza", OrderStatus::Served, 10),
            order("o2", 1, "beer", OrderStatus::Served, 5),
        ];
        let signals = TableSignals {
            explicit_status: Some(TableStatus::Occupied),
            active_orders: &orders,
            ..Default::default()
        };
        assert_eq!(
            status_of(1, &signals),
            FloorStatus::Occupied {
                awaiting_payment: true
            }
        );
    }

    #[test]
    fn test_paid_and_dismissed_orders_do_not_count() {
        let orders = vec![
            order("o1", 1, "pizza", OrderStatus::Paid, 10),
            order("w1", 1, SYS_WAITER_CALL, OrderStatus::Served, 0),
            order("c1", 1, "pizza", OrderStatus::Cancelled, 10),
        ];
        let signals = TableSignals {
            explicit_status: Some(TableStatus::Available),
            active_orders: &orders,
            ..Default::default()
        };
        assert_eq!(status_of(1, &signals), FloorStatus::Available);
    }

    #[test]
    fn test_payment_request_outranks_waiter_call() {
        let orders = vec![
            order("p1", 1, SYS_PAYMENT_REQUEST, OrderStatus::Pending, 0),
            order("w1", 1, SYS_WAITER_CALL, OrderStatus::Pending, 0),
        ];
        let signals = TableSignals {
            active_orders: &orders,
            ..Default::default()
        };
        assert_eq!(
            status_of(1, &signals),
            FloorStatus::SystemCall(SystemSignal::RequestPayment)
        );
    }

    #[test]
    fn test_unknown_table_defaults_to_available() {
        assert_eq!(status_of(5, &TableSignals::default()), FloorStatus::Available);
    }

    #[test]
    fn test_floor_reports_anomalies() {
        let tables = vec![
            Table::new(1).with_status(TableStatus::Occupied),
            Table::new(2),
        ];
        let sessions = vec![
            TableSession::open("a", 1, 0),
            TableSession::open("b", 1, 1),
            TableSession::open("zombie", 2, 0),
        ];
        let mut orphan = order("x", 0, "pizza", OrderStatus::Pending, 3);
        orphan.table_session = None;
        let orders = vec![
            order("o1", 1, "pizza", OrderStatus::Pending, 10),
            order("o9", 9, "pizza", OrderStatus::Pending, 4),
            orphan,
        ];

        let view = reconcile_floor(&tables, &sessions, &orders);

        assert_eq!(
            view.status(1),
            Some(FloorStatus::Occupied {
                awaiting_payment: false
            })
        );
        // Zombie session alone does not occupy table 2
        assert_eq!(view.status(2), Some(FloorStatus::Available));
        assert!(view.anomalies.contains(&FloorAnomaly::DuplicateOpenSessions {
            table: 1,
            session_ids: vec!["a".into(), "b".into()],
        }));
        assert!(view.anomalies.contains(&FloorAnomaly::StaleSession {
            table: 2,
            session_id: "zombie".into(),
        }));
        assert!(view.anomalies.contains(&FloorAnomaly::UnknownTable {
            table: 9,
            order_ids: vec!["o9".into()],
        }));
        assert!(view.anomalies.contains(&FloorAnomaly::OrphanOrders {
            order_ids: vec!["x".into()],
        }));
    }

    #[test]
    fn test_diff_only_reports_changed_tables() {
        let tables = vec![Table::new(1), Table::new(2), Table::new(3)];
        let before = reconcile_floor(&tables, &[], &[]);

        let orders = vec![order("o1", 2, "pizza", OrderStatus::Pending, 8)];
        let after = reconcile_floor(&tables[..2], &[], &orders);

        let changes = diff(&before, &after);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].table, 2);
        assert_eq!(
            changes[0].after.as_ref().map(|e| e.status),
            Some(FloorStatus::Occupied {
                awaiting_payment: false
            })
        );
        assert_eq!(changes[1].table, 3);
        assert!(changes[1].after.is_none());

        assert!(diff(&after, &after).is_empty());
    }
}
