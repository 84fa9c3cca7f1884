//! Mock server state

use crab_table::MemoryStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryStore>,
    /// When false, `PATCH /api/orders/{id}/status` is not routed (405) and
    /// clients must fall back to PUT
    pub patch_enabled: bool,
}

impl AppState {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            patch_enabled: true,
        }
    }

    pub fn with_patch(mut self, enabled: bool) -> Self {
        self.patch_enabled = enabled;
        self
    }
}
