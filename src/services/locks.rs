use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-key async mutexes. Dispatch serializes on the section
/// code; register/resubscribe serialize on a (contact, section) key. There
/// is no global lock, so work on different keys proceeds in parallel. An
/// entry is removed when its last holder releases and no one is waiting,
/// so the map stays bounded by the keys currently in flight.
#[derive(Default)]
pub struct KeyedLocks {
    inner: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> KeyedGuard<'_> {
        let lock = {
            let mut map = self.inner.lock().expect("lock registry poisoned");
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;
        KeyedGuard {
            locks: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn key_count(&self) -> usize {
        self.inner.lock().expect("lock registry poisoned").len()
    }
}

pub struct KeyedGuard<'a> {
    locks: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        // Release the mutex first so our Arc clone is gone before counting.
        self.guard.take();
        let Ok(mut map) = self.locks.inner.lock() else {
            return;
        };
        // Holders and waiters each own a clone; a strong count of one means
        // the map's entry is the only reference left. Clones are only taken
        // under the map lock, so the check cannot race a new acquire.
        if let Some(entry) = map.get(&self.key) {
            if Arc::strong_count(entry) == 1 {
                map.remove(&self.key);
            }
        }
    }
}
