//! Crab Store Mock server
//!
//! | 环境变量 | 默认值 | 说明 |
//! |----------|--------|------|
//! | CRAB_MOCK_ADDR | 0.0.0.0:3100 | 监听地址 |
//! | CRAB_RESTAURANT | demo | 预置餐厅 slug |
//! | CRAB_MOCK_TABLES | 20 | 预置桌台数量 |
//! | CRAB_MOCK_PATCH | true | 是否开放 PATCH |
//! | CRAB_LOG_DIR | - | 日志目录(按天滚动) |

use crab_store_mock::{AppState, router};
use crab_table::MemoryStore;
use std::sync::Arc;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let log_dir = std::env::var("CRAB_LOG_DIR").ok();
    crab_table::logger::init_logger_with_file(None, log_dir.as_deref());

    let addr: String = env_or("CRAB_MOCK_ADDR", "0.0.0.0:3100".to_string());
    let restaurant: String = env_or("CRAB_RESTAURANT", "demo".to_string());
    let tables: u32 = env_or("CRAB_MOCK_TABLES", 20);
    let patch_enabled: bool = env_or("CRAB_MOCK_PATCH", true);

    let store = Arc::new(MemoryStore::new());
    store.add_tables(&restaurant, 1..=tables);

    let app = router(AppState::new(store).with_patch(patch_enabled));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %listener.local_addr()?, restaurant = %restaurant, tables, patch_enabled, "Crab store mock listening");

    axum::serve(listener, app).await?;
    Ok(())
}
