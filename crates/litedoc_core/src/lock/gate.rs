//! Manually signaled multi-waiter gate.

use parking_lot::{Condvar, Mutex};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct GateState {
    signaled: bool,
    generation: u64,
    wakers: Vec<Waker>,
}

/// A gate that releases every waiter when set and blocks again once reset.
///
/// `wait` returns immediately while the gate is set. Otherwise it returns
/// at the next [`Gate::set`], even if the gate is reset again before the
/// waiter gets to run. Both blocking threads and async tasks can wait.
#[derive(Debug, Default)]
pub struct Gate {
    state: Mutex<GateState>,
    condvar: Condvar,
}

impl Gate {
    /// Creates a gate, initially set or not.
    #[must_use]
    pub fn new(signaled: bool) -> Self {
        Self {
            state: Mutex::new(GateState {
                signaled,
                ..GateState::default()
            }),
            condvar: Condvar::new(),
        }
    }

    /// Opens the gate, releasing all current and future waiters.
    pub fn set(&self) {
        let wakers = {
            let mut state = self.state.lock();
            state.signaled = true;
            state.generation = state.generation.wrapping_add(1);
            std::mem::take(&mut state.wakers)
        };
        self.condvar.notify_all();
        for waker in wakers {
            waker.wake();
        }
    }

    /// Closes the gate so later waits block.
    pub fn reset(&self) {
        self.state.lock().signaled = false;
    }

    /// True while the gate is open.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.state.lock().signaled
    }

    /// Counter bumped by every [`Gate::set`].
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Blocks until the gate is set.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        if state.signaled {
            return;
        }
        let generation = state.generation;
        while state.generation == generation {
            self.condvar.wait(&mut state);
        }
    }

    /// Blocks until the gate is set or `timeout` elapses. Returns false on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_until(deadline),
            None => {
                self.wait();
                true
            }
        }
    }

    /// Blocks until the gate is set or `deadline` passes. Returns false on timeout.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let generation = {
            let state = self.state.lock();
            if state.signaled {
                return true;
            }
            state.generation
        };
        self.wait_for_set_since(generation, deadline)
    }

    /// Blocks until some `set` happens after generation `since` was observed.
    ///
    /// Lets a caller read the generation while holding its own lock and wait
    /// after releasing it without missing a `set` in between.
    pub fn wait_for_set_since(&self, since: u64, deadline: Instant) -> bool {
        let mut state = self.state.lock();
        while state.generation == since {
            if self.condvar.wait_until(&mut state, deadline).timed_out() {
                return state.generation != since;
            }
        }
        true
    }

    /// Future resolving at the next `set`, or immediately if the gate is open.
    #[must_use]
    pub fn wait_async(&self) -> GateWait<'_> {
        let state = self.state.lock();
        GateWait {
            gate: self,
            generation: state.generation,
            ready: state.signaled,
        }
    }
}

/// Future returned by [`Gate::wait_async`].
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct GateWait<'a> {
    gate: &'a Gate,
    generation: u64,
    ready: bool,
}

impl Future for GateWait<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.ready {
            return Poll::Ready(());
        }
        let mut state = self.gate.state.lock();
        if state.generation != self.generation {
            return Poll::Ready(());
        }
        if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn waiters_block_until_set() {
        let gate = Arc::new(Gate::new(false));
        let done = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    gate.wait();
                    done.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(done.load(Ordering::SeqCst), 0);
        gate.set();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(done.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn reset_blocks_again() {
        let gate = Gate::new(true);
        gate.wait();
        assert!(gate.wait_timeout(Duration::from_millis(1)));
        gate.reset();
        assert!(!gate.is_set());
        assert!(!gate.wait_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn set_then_reset_still_releases_waiter() {
        let gate = Gate::new(false);
        let since = gate.generation();
        gate.set();
        gate.reset();
        assert!(gate.wait_for_set_since(since, Instant::now() + Duration::from_millis(10)));
    }

    #[tokio::test]
    async fn async_waiters_resolve_on_set() {
        let gate = Arc::new(Gate::new(false));
        let mut tasks = Vec::new();
        for _ in 0..4 {
            let gate = Arc::clone(&gate);
            tasks.push(tokio::spawn(async move { gate.wait_async().await }));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(tasks.iter().all(|t| !t.is_finished()));
        gate.set();
        for task in tasks {
            task.await.unwrap();
        }
        gate.wait_async().await;
    }
}
