use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::compliance::domain::WorkerId;

/// Keyed mutex table serializing recomputes of the same worker.
///
/// An entry lives only while some recompute holds it, so the table never outgrows the
/// number of workers being recomputed at once.
#[derive(Debug, Default)]
pub(crate) struct WorkerLocks {
    table: Mutex<HashMap<WorkerId, Arc<Mutex<()>>>>,
}

impl WorkerLocks {
    pub(crate) fn lock_for(&self, worker_id: &WorkerId) -> Arc<Mutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table
            .entry(worker_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Hands back a lock from [`WorkerLocks::lock_for`]; the last holder removes the entry.
    pub(crate) fn release(&self, worker_id: &WorkerId, lock: Arc<Mutex<()>>) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if table
            .get(worker_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            table.remove(worker_id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_worker_shares_one_lock() {
        let locks = WorkerLocks::default();
        let first = locks.lock_for(&WorkerId::from("w-1"));
        let second = locks.lock_for(&WorkerId::from("w-1"));
        let other = locks.lock_for(&WorkerId::from("w-2"));
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn last_release_removes_the_entry() {
        let locks = WorkerLocks::default();
        let worker = WorkerId::from("w-1");
        let first = locks.lock_for(&worker);
        let second = locks.lock_for(&worker);

        locks.release(&worker, first);
        assert_eq!(locks.len(), 1);
        locks.release(&worker, second);
        assert_eq!(locks.len(), 0);

        let fresh = locks.lock_for(&worker);
        assert_eq!(locks.len(), 1);
        locks.release(&worker, fresh);
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn table_drains_after_many_workers() {
        let locks = WorkerLocks::default();
        std::thread::scope(|scope| {
            for thread in 0..4 {
                let locks = &locks;
                scope.spawn(move || {
                    for index in 0..250 {
                        let worker = WorkerId(format!("w-{}", (thread * 250 + index) % 300));
                        let lock = locks.lock_for(&worker);
                        drop(lock.lock().unwrap_or_else(PoisonError::into_inner));
                        locks.release(&worker, lock);
                    }
                });
            }
        });
        assert_eq!(locks.len(), 0);
    }
}
