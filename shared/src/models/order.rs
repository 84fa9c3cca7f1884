//! Order Model

use crate::types::{TableNumber, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Product id of the synthetic call-waiter order
pub const SYS_WAITER_CALL: &str = "sys-waiter-call";
/// Product id of the synthetic request-payment order
pub const SYS_PAYMENT_REQUEST: &str = "sys-payment-request";

/// Order status
///
/// Forward chain: `pending → preparing → served → paid`.
/// `cancelled` is reachable from `pending` / `preparing` only.
/// `paid` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Preparing,
    Served,
    Paid,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Preparing => "preparing",
            Self::Served => "served",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Paid)
    }

    /// Paid or cancelled: nothing left to collect for this order
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }

    /// Position on the forward chain (cancelled sits outside it)
    fn rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Preparing => Some(1),
            Self::Served => Some(2),
            Self::Paid => Some(3),
            Self::Cancelled => None,
        }
    }

    /// Whether `self → next` is allowed. Re-setting the same status is always
    /// allowed (it is a no-op on the store).
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if *self == next {
            return true;
        }
        match (self.rank(), next.rank()) {
            (Some(current), Some(target)) => target > current,
            (Some(current), None) => current <= 1,
            (None, _) => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "preparing" => Ok(Self::Preparing),
            "served" => Ok(Self::Served),
            "paid" => Ok(Self::Paid),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

/// Out-of-band signal carried by a zero-amount system order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SystemSignal {
    /// 呼叫服务员
    CallWaiter,
    /// 请求结账
    RequestPayment,
}

impl SystemSignal {
    pub fn product_id(&self) -> &'static str {
        match self {
            Self::CallWaiter => SYS_WAITER_CALL,
            Self::RequestPayment => SYS_PAYMENT_REQUEST,
        }
    }

    pub fn from_product_id(product_id: &str) -> Option<Self> {
        match product_id {
            SYS_WAITER_CALL => Some(Self::CallWaiter),
            SYS_PAYMENT_REQUEST => Some(Self::RequestPayment),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::CallWaiter => "Waiter requested",
            Self::RequestPayment => "Bill requested",
        }
    }
}

/// Order line item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub quantity: u32,
    /// Price in currency unit
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Relational context of an order: the session it was placed under and,
/// when the store could join it, the table number.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRef {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub table: Option<TableNumber>,
}

/// Order entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    pub status: OrderStatus,
    /// Total amount in currency unit
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub table_session: Option<SessionRef>,
    /// Discount recorded at settlement (currency unit)
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub discount: Option<Decimal>,
}

impl Order {
    /// The system signal this order carries, if it is a synthetic order
    pub fn system_signal(&self) -> Option<SystemSignal> {
        self.items
            .iter()
            .find_map(|item| SystemSignal::from_product_id(&item.product_id))
    }

    pub fn is_system(&self) -> bool {
        self.system_signal().is_some()
    }

    pub fn table(&self) -> Option<TableNumber> {
        self.table_session.as_ref().and_then(|s| s.table)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.table_session
            .as_ref()
            .and_then(|s| s.session_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(product_id: &str) -> OrderItem {
        OrderItem {
            product_id: product_id.to_string(),
            name: None,
            quantity: 1,
            unit_price: Decimal::ZERO,
            notes: None,
        }
    }

    #[test]
    fn test_forward_transitions() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Preparing));
        assert!(Pending.can_transition_to(Paid));
        assert!(Served.can_transition_to(Paid));
        assert!(Paid.can_transition_to(Paid));
        assert!(!Paid.can_transition_to(Pending));
        assert!(!Paid.can_transition_to(Served));
        assert!(!Served.can_transition_to(Preparing));
    }

    #[test]
    fn test_cancel_transitions() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Preparing.can_transition_to(Cancelled));
        assert!(!Served.can_transition_to(Cancelled));
        assert!(!Paid.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(Cancelled.can_transition_to(Cancelled));
    }

    #[test]
    fn test_system_signal_from_items() {
        let order = Order {
            id: "o1".into(),
            status: OrderStatus::Pending,
            total: Decimal::ZERO,
            created_at: 0,
            updated_at: 0,
            notes: None,
            items: vec![item(SYS_WAITER_CALL)],
            table_session: None,
            discount: None,
        };
        assert_eq!(order.system_signal(), Some(SystemSignal::CallWaiter));

        let regular = Order {
            items: vec![item("pizza-margherita")],
            ..order
        };
        assert!(!regular.is_system());
    }

    #[test]
    fn test_order_wire_format() {
        let json = r#"{
            "id": "o-9",
            "status": "served",
            "total": 12.5,
            "created_at": 1,
            "updated_at": 2,
            "items": [{"product_id": "p1", "quantity": 2, "unit_price": 6.25}],
            "table_session": {"session_id": "s1", "table": 4}
        }"#;
        let order: Order = serde_json::from_str(json).unwrap();
        assert_eq!(order.status, OrderStatus::Served);
        assert_eq!(order.total, Decimal::new(125, 1));
        assert_eq!(order.table(), Some(4));
        assert_eq!(order.session_id(), Some("s1"));
        assert_eq!(order.items[0].line_total(), Decimal::new(125, 1));
        assert!(order.discount.is_none());
    }
}
