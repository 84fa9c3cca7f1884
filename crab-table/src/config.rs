//! Engine configuration

use crate::retry::RetryPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// 引擎配置 - 顾客端与收银台共用
///
/// # 环境变量
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | CRAB_STORE_URL | http://localhost:3100 | 远程存储地址 |
/// | CRAB_RESTAURANT | demo | 餐厅 slug |
/// | CRAB_POLL_INTERVAL_MS | 5000 | 轮询间隔(毫秒) |
/// | CRAB_REQUEST_TIMEOUT_SECS | 10 | 请求超时(秒) |
/// | CRAB_PAGE_SIZE | 50 | 分页大小 |
/// | CRAB_CLAIM_ATTEMPTS | 3 | 开台最大尝试次数 |
/// | CRAB_SUBMIT_ATTEMPTS | 3 | 下单最大尝试次数 |
/// | CRAB_WRITE_ATTEMPTS | 3 | 收银台写操作最大尝试次数 |
/// | CRAB_RETRY_BACKOFF_MS | 500 | 重试间隔(毫秒) |
/// | CRAB_SETTLE_WAIT_MS | 800 | 结账后等待存储同步(毫秒) |
/// | CRAB_IDENTITY_FILE | - | 会话 ID 持久化文件 |
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Remote store base URL
    pub store_url: String,
    /// Restaurant slug used in every store path
    pub restaurant: String,
    /// Poll loop interval (staff console and eviction watchdog)
    pub poll_interval: Duration,
    /// Transport timeout for every request
    pub request_timeout: Duration,
    /// Page size used when iterating list operations
    pub page_size: u32,
    /// Bounded attempts for table claims on transient failures
    pub claim_attempts: u32,
    /// Bounded attempts for order submission on propagation lag
    pub submit_attempts: u32,
    /// Bounded attempts for staff writes (mark paid, release, status)
    pub write_attempts: u32,
    /// Fixed backoff between attempts
    pub retry_backoff: Duration,
    /// Wait after settlement before verifying the table was released
    pub settle_wait: Duration,
    /// Identity file; `None` keeps session ids in memory only
    pub identity_file: Option<PathBuf>,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl EngineConfig {
    /// 从环境变量加载配置（会先读取 .env）
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            store_url: std::env::var("CRAB_STORE_URL")
                .unwrap_or_else(|_| "http://localhost:3100".into()),
            restaurant: std::env::var("CRAB_RESTAURANT").unwrap_or_else(|_| "demo".into()),
            poll_interval: Duration::from_millis(env_or("CRAB_POLL_INTERVAL_MS", 5000)),
            request_timeout: Duration::from_secs(env_or("CRAB_REQUEST_TIMEOUT_SECS", 10)),
            page_size: env_or("CRAB_PAGE_SIZE", 50),
            claim_attempts: env_or("CRAB_CLAIM_ATTEMPTS", 3),
            submit_attempts: env_or("CRAB_SUBMIT_ATTEMPTS", 3),
            write_attempts: env_or("CRAB_WRITE_ATTEMPTS", 3),
            retry_backoff: Duration::from_millis(env_or("CRAB_RETRY_BACKOFF_MS", 500)),
            settle_wait: Duration::from_millis(env_or("CRAB_SETTLE_WAIT_MS", 800)),
            identity_file: std::env::var("CRAB_IDENTITY_FILE").ok().map(PathBuf::from),
        }
    }

    /// Defaults without touching the environment (tests, embedding)
    pub fn new(store_url: impl Into<String>, restaurant: impl Into<String>) -> Self {
        Self {
            store_url: store_url.into(),
            restaurant: restaurant.into(),
            poll_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            page_size: 50,
            claim_attempts: 3,
            submit_attempts: 3,
            write_attempts: 3,
            retry_backoff: Duration::from_millis(500),
            settle_wait: Duration::from_millis(800),
            identity_file: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_settle_wait(mut self, wait: Duration) -> Self {
        self.settle_wait = wait;
        self
    }

    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    pub fn claim_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.claim_attempts, self.retry_backoff)
    }

    pub fn submit_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.submit_attempts, self.retry_backoff)
    }

    pub fn write_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.write_attempts, self.retry_backoff)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
