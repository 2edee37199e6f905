//! Per-id lock registry guarding `save`/`delete` (spec §4.2). Reads stay
//! lock-free; only writers serialize, and only for the duration of the
//! file-write critical section — never while enqueuing events.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        self.locks.lock().entry(id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Run `f` while holding the lock for `id`. The guard is dropped before
    /// this function returns, so callers must not assume the lock is still
    /// held once `f`'s result is produced elsewhere (e.g. event emission).
    pub fn with_lock<T>(&self, id: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(id);
        let _guard = lock.lock();
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc as StdArc;

    #[test]
    fn concurrent_saves_to_same_id_serialize() {
        let registry = StdArc::new(LockRegistry::new());
        let counter = StdArc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let counter = counter.clone();
            handles.push(std::thread::spawn(move || {
                registry.with_lock("x", || {
                    let before = counter.fetch_add(1, Ordering::SeqCst);
                    std::thread::yield_now();
                    assert_eq!(counter.load(Ordering::SeqCst), before + 1);
                });
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }
}
