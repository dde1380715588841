//! In-memory lock manager.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::lock::{LockAcquire, LockError, LockLease, LockManager, LockOptions, LockStrategy};

/// Lock manager over a process-local key set. Busy when the key is already
/// held; acquisition can be made to error for failure-path tests.
#[derive(Default)]
pub struct MockLockManager {
    held: Mutex<HashSet<String>>,
    fail_acquire: AtomicBool,
}

impl MockLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-hold a key, as if another process owned it.
    pub async fn hold(&self, key: &str) {
        self.held.lock().await.insert(key.to_string());
    }

    pub async fn is_held(&self, key: &str) -> bool {
        self.held.lock().await.contains(key)
    }

    /// Make acquisition fail with a database error.
    pub fn set_fail_acquire(&self) {
        self.fail_acquire.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl LockManager for MockLockManager {
    async fn acquire(&self, key: &str, _options: &LockOptions) -> Result<LockAcquire, LockError> {
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(LockError::Database(sqlx::Error::PoolClosed));
        }
        let mut held = self.held.lock().await;
        if held.contains(key) {
            return Ok(LockAcquire::Busy);
        }
        held.insert(key.to_string());
        Ok(LockAcquire::Acquired(LockLease::detached(
            key,
            LockStrategy::Memory,
        )))
    }

    async fn release(&self, lease: LockLease) {
        self.held.lock().await.remove(lease.key());
    }
}
