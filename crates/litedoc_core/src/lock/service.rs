//! Per-collection reader/writer locks.

use super::gate::Gate;
use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lock strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Many holders, blocks behind writers.
    Shared,
    /// One holder.
    Exclusive,
}

#[derive(Debug, Default)]
struct LockEntry {
    readers: HashMap<u64, usize>,
    writer: Option<(u64, usize)>,
    waiting_writers: usize,
}

impl LockEntry {
    fn try_grant(&mut self, owner: u64, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => {
                let own_writer = matches!(self.writer, Some((w, _)) if w == owner);
                let reentrant = self.readers.contains_key(&owner);
                let free = self.writer.is_none() && self.waiting_writers == 0;
                if own_writer || reentrant || free {
                    *self.readers.entry(owner).or_insert(0) += 1;
                    true
                } else {
                    false
                }
            }
            LockMode::Exclusive => {
                let other_readers = self.readers.keys().any(|&r| r != owner);
                match self.writer {
                    Some((w, ref mut count)) if w == owner => {
                        *count += 1;
                        true
                    }
                    None if !other_readers => {
                        self.writer = Some((owner, 1));
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    fn release(&mut self, owner: u64, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => match self.readers.get_mut(&owner) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    true
                }
                Some(_) => {
                    self.readers.remove(&owner);
                    true
                }
                None => false,
            },
            LockMode::Exclusive => match self.writer {
                Some((w, ref mut count)) if w == owner => {
                    if *count > 1 {
                        *count -= 1;
                    } else {
                        self.writer = None;
                    }
                    true
                }
                _ => false,
            },
        }
    }

    fn is_idle(&self) -> bool {
        self.readers.is_empty() && self.writer.is_none() && self.waiting_writers == 0
    }
}

/// Coordinates collection locks between transactions.
///
/// Contended requests park on a shared [`Gate`]. Every release opens the
/// gate and all parked requests retry; the first to succeed wins and the
/// rest park again. Waiting writers hold off new readers.
#[derive(Debug)]
pub struct LockService {
    entries: Mutex<HashMap<String, LockEntry>>,
    gate: Gate,
    timeout: Duration,
}

impl LockService {
    /// Creates a lock service with the given wait bound.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            gate: Gate::new(false),
            timeout,
        }
    }

    /// Default wait bound.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Acquires `collection` for `owner`, waiting up to the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` if the lock is still held when the wait expires.
    /// Nothing is acquired in that case.
    pub fn acquire(&self, collection: &str, owner: u64, mode: LockMode) -> CoreResult<()> {
        self.acquire_timeout(collection, owner, mode, self.timeout)
    }

    /// Like [`LockService::acquire`] with an explicit bound.
    pub fn acquire_timeout(
        &self,
        collection: &str,
        owner: u64,
        mode: LockMode,
        timeout: Duration,
    ) -> CoreResult<()> {
        let deadline = Instant::now().checked_add(timeout);
        let mut queued = false;
        loop {
            let since = {
                let mut entries = self.entries.lock();
                let entry = entries.entry(collection.to_string()).or_default();
                if entry.try_grant(owner, mode) {
                    if queued {
                        entry.waiting_writers -= 1;
                    }
                    return Ok(());
                }
                if mode == LockMode::Exclusive && !queued {
                    entry.waiting_writers += 1;
                    queued = true;
                }
                self.gate.reset();
                self.gate.generation()
            };

            let released = match deadline {
                Some(deadline) => self.gate.wait_for_set_since(since, deadline),
                None => {
                    self.gate.wait();
                    true
                }
            };
            if !released {
                self.abandon(collection, queued);
                tracing::warn!(collection, owner, ?mode, ?timeout, "lock wait timed out");
                return Err(CoreError::LockTimeout {
                    collection: collection.to_string(),
                    timeout,
                });
            }
        }
    }

    fn abandon(&self, collection: &str, queued: bool) {
        if !queued {
            return;
        }
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(collection) {
            entry.waiting_writers -= 1;
            if entry.is_idle() {
                entries.remove(collection);
            }
        }
        // readers held back by this writer may proceed now
        self.gate.set();
    }

    /// Releases one hold of `collection`. Unknown holds are ignored.
    pub fn release(&self, collection: &str, owner: u64, mode: LockMode) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(collection) else {
            return;
        };
        if entry.release(owner, mode) {
            if entry.is_idle() {
                entries.remove(collection);
            }
            self.gate.set();
        }
    }

    /// Takes a shared lock released when the guard drops.
    pub fn read(self: &Arc<Self>, collection: &str, owner: u64) -> CoreResult<SharedLockGuard> {
        self.acquire(collection, owner, LockMode::Shared)?;
        Ok(SharedLockGuard {
            service: Arc::clone(self),
            collection: collection.to_string(),
            owner,
        })
    }

    /// True if any transaction holds or waits for `collection`.
    #[must_use]
    pub fn is_locked(&self, collection: &str) -> bool {
        self.entries.lock().contains_key(collection)
    }

    /// Current writer of `collection`, if any.
    #[must_use]
    pub fn writer(&self, collection: &str) -> Option<u64> {
        self.entries
            .lock()
            .get(collection)
            .and_then(|e| e.writer.map(|(w, _)| w))
    }
}

/// Shared lock held for the guard's lifetime.
#[derive(Debug)]
pub struct SharedLockGuard {
    service: Arc<LockService>,
    collection: String,
    owner: u64,
}

impl Drop for SharedLockGuard {
    fn drop(&mut self) {
        self.service
            .release(&self.collection, self.owner, LockMode::Shared);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn exclusive_is_reentrant() {
        let locks = LockService::new(Duration::from_millis(20));
        locks.acquire("a", 1, LockMode::Exclusive).unwrap();
        locks.acquire("a", 1, LockMode::Exclusive).unwrap();
        locks.acquire("a", 1, LockMode::Shared).unwrap();
        locks.release("a", 1, LockMode::Shared);
        locks.release("a", 1, LockMode::Exclusive);
        assert_eq!(locks.writer("a"), Some(1));
        locks.release("a", 1, LockMode::Exclusive);
        assert!(!locks.is_locked("a"));
    }

    #[test]
    fn contention_times_out() {
        let locks = LockService::new(Duration::from_millis(30));
        locks.acquire("a", 1, LockMode::Exclusive).unwrap();
        let err = locks.acquire("a", 2, LockMode::Exclusive).unwrap_err();
        assert!(matches!(err, CoreError::LockTimeout { ref collection, .. } if collection == "a"));
        assert!(locks.acquire("a", 3, LockMode::Shared).is_err());
        locks.acquire("b", 2, LockMode::Exclusive).unwrap();
        locks.release("a", 1, LockMode::Exclusive);
        locks.acquire("a", 2, LockMode::Shared).unwrap();
    }

    #[test]
    fn readers_share() {
        let locks = Arc::new(LockService::new(Duration::from_millis(30)));
        let g1 = locks.read("a", 1).unwrap();
        let g2 = locks.read("a", 2).unwrap();
        assert!(locks.acquire("a", 3, LockMode::Exclusive).is_err());
        drop(g1);
        drop(g2);
        assert!(!locks.is_locked("a"));
        locks.acquire("a", 3, LockMode::Exclusive).unwrap();
    }

    #[test]
    fn queued_writer_holds_back_new_readers() {
        let locks = Arc::new(LockService::new(Duration::from_secs(5)));
        let reader = locks.read("a", 1).unwrap();

        let writer = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || locks.acquire("a", 2, LockMode::Exclusive))
        };
        while locks.entries.lock().get("a").map_or(0, |e| e.waiting_writers) == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        let err = locks
            .acquire_timeout("a", 3, LockMode::Shared, Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, CoreError::LockTimeout { .. }));
        // the existing reader may still re-enter
        locks.acquire("a", 1, LockMode::Shared).unwrap();
        locks.release("a", 1, LockMode::Shared);

        drop(reader);
        writer.join().unwrap().unwrap();
        assert_eq!(locks.writer("a"), Some(2));
        assert_eq!(locks.entries.lock()["a"].waiting_writers, 0);

        locks.release("a", 2, LockMode::Exclusive);
        locks
            .acquire_timeout("a", 3, LockMode::Shared, Duration::from_millis(50))
            .unwrap();
    }

    #[test]
    fn waiters_acquire_in_turn_after_release() {
        let locks = Arc::new(LockService::new(Duration::from_secs(5)));
        locks.acquire("a", 0, LockMode::Exclusive).unwrap();
        let holders = Arc::new(AtomicUsize::new(0));
        let max_holders = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (1..=6u64)
            .map(|owner| {
                let locks = Arc::clone(&locks);
                let holders = Arc::clone(&holders);
                let max_holders = Arc::clone(&max_holders);
                thread::spawn(move || {
                    locks.acquire("a", owner, LockMode::Exclusive).unwrap();
                    let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                    max_holders.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    holders.fetch_sub(1, Ordering::SeqCst);
                    locks.release("a", owner, LockMode::Exclusive);
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(30));
        assert_eq!(holders.load(Ordering::SeqCst), 0);
        locks.release("a", 0, LockMode::Exclusive);
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_holders.load(Ordering::SeqCst), 1);
        assert!(!locks.is_locked("a"));
    }
}
