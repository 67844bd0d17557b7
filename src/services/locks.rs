use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::BookId;

/// Per-book generation locks.
///
/// Serializes the expensive generate-and-cache sequence per book id while
/// leaving different books fully parallel. Entries are created on demand and
/// removed as soon as the last holder or waiter is gone, so the table stays
/// bounded under churn.
#[derive(Default)]
pub struct LockTable {
    locks: Mutex<HashMap<BookId, Arc<AsyncMutex<()>>>>,
}

/// Holds the per-book lock until dropped.
pub struct LockGuard<'a> {
    table: &'a LockTable,
    book_id: BookId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `book_id`, waiting at most `wait`.
    ///
    /// Returns `None` on timeout: the caller then proceeds to generate
    /// independently instead of deadlocking behind a stuck holder.
    pub async fn acquire(&self, book_id: BookId, wait: Duration) -> Option<LockGuard<'_>> {
        let lock = {
            let mut locks = self.locks.lock().expect("lock table poisoned");
            locks.entry(book_id).or_default().clone()
        };

        match tokio::time::timeout(wait, lock.lock_owned()).await {
            Ok(guard) => Some(LockGuard {
                table: self,
                book_id,
                guard: Some(guard),
            }),
            Err(_) => {
                tracing::warn!(book_id, "Generation lock wait timed out, proceeding without it");
                // This wait may have been the last reference keeping an
                // already-released entry alive.
                self.release(book_id);
                None
            }
        }
    }

    /// Number of live lock entries, for tests and diagnostics.
    pub fn len(&self) -> usize {
        self.locks.lock().expect("lock table poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, book_id: BookId) {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        if let Some(lock) = locks.get(&book_id) {
            // Only the table's own reference left: no holder, no waiters.
            if Arc::strong_count(lock) <= 1 {
                locks.remove(&book_id);
            }
        }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        // Hand the mutex back first so this guard's handle is not counted
        // as a waiter by the check in release.
        self.guard.take();
        self.table.release(self.book_id);
    }
}
