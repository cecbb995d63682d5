//! In-process mutual exclusion per role name

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Lazily created mutex per role name
///
/// Serializes load-modify-persist cycles on one role within a process.
/// Cross-process exclusion comes from the store's expected-version check.
#[derive(Debug, Default)]
pub struct RoleLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RoleLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, role: &str) -> Arc<Mutex<()>> {
        // A poisoned map still holds valid handles
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(role.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `f` while holding the lock for `role`
    pub fn with_lock<R>(&self, role: &str, f: impl FnOnce() -> R) -> R {
        let handle = self.handle(role);
        let _guard = match handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_same_role_is_serialized() {
        let locks = Arc::new(RoleLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    locks.with_lock("bins-2", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(2));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_returns_closure_value() {
        let locks = RoleLocks::new();
        assert_eq!(locks.with_lock("snapshot", || 7), 7);
        // Re-entry on a different role does not deadlock
        let nested = locks.with_lock("bins-0", || locks.with_lock("bins-1", || 3));
        assert_eq!(nested, 3);
    }
}
