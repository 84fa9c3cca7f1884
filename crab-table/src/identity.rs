//! Session Identity Provider - 顾客端会话 ID
//!
//! Each (restaurant, table) visit on a device gets one client-generated id
//! that survives reloads. Ids are kept in a small JSON file when one is
//! configured; without a file, or when the file cannot be written, they live
//! in memory only.

use crate::error::ClientResult;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared::types::{TableNumber, Timestamp};
use shared::util::now_millis;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::watch;

/// The visit currently in front of the customer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentSession {
    pub restaurant: String,
    pub table: TableNumber,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredIdentity {
    session_id: String,
    created_at: Timestamp,
}

/// 会话文件结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct IdentityFile {
    sessions: HashMap<String, StoredIdentity>,
}

fn key(restaurant: &str, table: TableNumber) -> String {
    format!("{}:{}", restaurant, table)
}

/// 会话 ID 提供者
pub struct SessionIdentityProvider {
    /// `None` once storage is unavailable
    file_path: Mutex<Option<PathBuf>>,
    data: Mutex<IdentityFile>,
    current: watch::Sender<Option<CurrentSession>>,
}

impl SessionIdentityProvider {
    /// Ephemeral provider, ids are lost with the process
    pub fn in_memory() -> Self {
        Self::with_data(None, IdentityFile::default())
    }

    /// 从文件加载
    ///
    /// A missing file starts empty. An unreadable or corrupt file is logged
    /// and replaced on the next write.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let data = match Self::read_file(&path) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Identity file unreadable, starting empty");
                IdentityFile::default()
            }
        };
        Self::with_data(Some(path), data)
    }

    fn with_data(file_path: Option<PathBuf>, data: IdentityFile) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            file_path: Mutex::new(file_path),
            data: Mutex::new(data),
            current,
        }
    }

    fn read_file(path: &Path) -> ClientResult<IdentityFile> {
        if !path.exists() {
            return Ok(IdentityFile::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_file(path: &Path, data: &IdentityFile) -> ClientResult<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(data)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// 保存到文件，失败则降级为内存模式
    fn persist(&self, data: &IdentityFile) {
        let mut file_path = self.file_path.lock();
        let Some(path) = file_path.as_ref() else {
            return;
        };
        if let Err(e) = Self::write_file(path, data) {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Identity storage unavailable, keeping session ids in memory"
            );
            *file_path = None;
        }
    }

    /// Whether ids are currently written to durable storage
    pub fn is_persistent(&self) -> bool {
        self.file_path.lock().is_some()
    }

    /// Stable id for this table visit, created on first use
    pub fn get_or_create_session_id(&self, restaurant: &str, table: TableNumber) -> String {
        let session_id = {
            let mut data = self.data.lock();
            let k = key(restaurant, table);
            match data.sessions.get(&k) {
                Some(stored) => stored.session_id.clone(),
                None => {
                    let session_id = uuid::Uuid::new_v4().to_string();
                    data.sessions.insert(
                        k,
                        StoredIdentity {
                            session_id: session_id.clone(),
                            created_at: now_millis(),
                        },
                    );
                    self.persist(&data);
                    tracing::info!(restaurant, table, session_id = %session_id, "New table session id");
                    session_id
                }
            }
        };

        self.publish(Some(CurrentSession {
            restaurant: restaurant.to_string(),
            table,
            session_id: session_id.clone(),
        }));
        session_id
    }

    /// Read without creating
    pub fn current(&self, restaurant: &str, table: TableNumber) -> Option<String> {
        self.data
            .lock()
            .sessions
            .get(&key(restaurant, table))
            .map(|s| s.session_id.clone())
    }

    /// End the visit; the next one gets a fresh id
    pub fn forget(&self, restaurant: &str, table: TableNumber) {
        let removed = {
            let mut data = self.data.lock();
            let removed = data.sessions.remove(&key(restaurant, table));
            if removed.is_some() {
                self.persist(&data);
            }
            removed
        };

        if let Some(stored) = removed {
            tracing::info!(restaurant, table, session_id = %stored.session_id, "Table session id forgotten");
            self.current.send_if_modified(|current| {
                let matches = current
                    .as_ref()
                    .is_some_and(|c| c.restaurant == restaurant && c.table == table);
                if matches {
                    *current = None;
                }
                matches
            });
        }
    }

    /// Observe the current visit (cart scoping etc.)
    pub fn subscribe(&self) -> watch::Receiver<Option<CurrentSession>> {
        self.current.subscribe()
    }

    fn publish(&self, next: Option<CurrentSession>) {
        self.current.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

impl std::fmt::Debug for SessionIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIdentityProvider")
            .field("file_path", &*self.file_path.lock())
            .field("sessions", &self.data.lock().sessions.len())
            .finish()
    }
}
