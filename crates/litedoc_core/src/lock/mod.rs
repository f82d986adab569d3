//! Concurrency coordination: the signal gate and collection locks.

mod gate;
mod service;

pub use gate::{Gate, GateWait};
pub use service::{LockMode, LockService, SharedLockGuard};
