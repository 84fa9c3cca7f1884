//! Common types for the shared crate

/// Timestamp type (Unix milliseconds)
pub type Timestamp = i64;

/// Restaurant-scoped table number
pub type TableNumber = u32;

/// Restaurant identifier used in every store path (e.g. "trattoria-roma")
pub type RestaurantSlug = String;
