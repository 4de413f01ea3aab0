//! Operation id generation

use helm_broker_core::OperationId;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Source of operation identifiers
pub trait OperationIdProvider: Send + Sync {
    /// Produce an id that was never handed out before
    fn next_id(&self) -> OperationId;
}

/// Random UUID v4 operation ids
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidOperationIdProvider;

impl OperationIdProvider for UuidOperationIdProvider {
    fn next_id(&self) -> OperationId {
        OperationId::new(Uuid::new_v4().to_string())
    }
}

/// Counter based ids: `op1`, `op2`, ...
///
/// Unique only within one process; meant for deterministic setups.
#[derive(Debug)]
pub struct SequentialIdProvider {
    next: AtomicU64,
}

impl SequentialIdProvider {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl Default for SequentialIdProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationIdProvider for SequentialIdProvider {
    fn next_id(&self) -> OperationId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        OperationId::new(format!("op{}", n))
    }
}
