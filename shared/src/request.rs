//! Request types for the remote store contract

use crate::models::{OrderStatus, SessionStatus, TableStatus};
use crate::types::TableNumber;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Maximum page size accepted by the store
pub const MAX_PER_PAGE: u32 = 200;

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    50
}

/// Pagination query parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageQuery {
    /// Page number (1-based, default: 1)
    #[serde(default = "default_page")]
    pub page: u32,
    /// Items per page (default: 50, max: 200)
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PageQuery {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }
    }

    /// Get the offset into the full result set
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1) as usize * self.limit() as usize
    }

    /// Get the limit (clamped to 1..=MAX_PER_PAGE)
    pub fn limit(&self) -> u32 {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    pub fn next(&self) -> Self {
        Self {
            page: self.page + 1,
            per_page: self.per_page,
        }
    }
}

/// GET /api/restaurants/{slug}/orders query
///
/// Fields are spelled out instead of flattening `PageQuery`
/// (flatten breaks numeric fields with urlencoded queries).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderListQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_status: Option<OrderStatus>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl OrderListQuery {
    /// All orders that still carry a balance (status != paid)
    pub fn unpaid(page: PageQuery) -> Self {
        Self {
            status: None,
            exclude_status: Some(OrderStatus::Paid),
            page: page.page,
            per_page: page.per_page,
        }
    }

    pub fn page_query(&self) -> PageQuery {
        PageQuery::new(self.page, self.per_page)
    }

    pub fn matches(&self, status: OrderStatus) -> bool {
        self.status.is_none_or(|s| s == status) && self.exclude_status != Some(status)
    }
}

/// GET /api/restaurants/{slug}/sessions query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionListQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl SessionListQuery {
    pub fn open(page: PageQuery) -> Self {
        Self {
            status: Some(SessionStatus::Open),
            page: page.page,
            per_page: page.per_page,
        }
    }

    pub fn page_query(&self) -> PageQuery {
        PageQuery::new(self.page, self.per_page)
    }
}

/// POST /api/restaurants/{slug}/tables/{n}/claim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimTableRequest {
    pub session_id: String,
}

/// PUT /api/restaurants/{slug}/tables/{n}/close response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CloseTableResponse {
    pub table: TableNumber,
    pub closed_sessions: u32,
}

/// PUT /api/restaurants/{slug}/tables/{n}/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetTableStatusRequest {
    pub status: TableStatus,
}

/// Line item of a create-order request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItemInput {
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl OrderItemInput {
    pub fn new(product_id: impl Into<String>, quantity: u32, unit_price: Decimal) -> Self {
        Self {
            product_id: product_id.into(),
            name: None,
            quantity,
            unit_price,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// POST /api/restaurants/{slug}/orders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub table: TableNumber,
    pub session_id: String,
    pub items: Vec<OrderItemInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl CreateOrderRequest {
    pub fn total(&self) -> Decimal {
        self.items.iter().map(OrderItemInput::line_total).sum()
    }
}

/// Create-order response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatedOrder {
    pub id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

/// PATCH /api/orders/{id}/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub discount: Option<Decimal>,
}

impl UpdateOrderStatusRequest {
    pub fn new(status: OrderStatus) -> Self {
        Self {
            status,
            discount: None,
        }
    }
}
