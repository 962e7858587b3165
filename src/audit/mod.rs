//! Action audit log
//!
//! Successful mutations are recorded with their ticket reference once a
//! request has finished. A failing sink never changes a mutation outcome.

mod postgres;
mod sink;

pub use postgres::{PostgresAuditLog, MAX_HISTORY_LIMIT};
pub use sink::{AuditEntry, AuditRecord, AuditSink};

#[cfg(test)]
pub(crate) use sink::memory::MemoryAuditLog;

/// Type alias for audit sink trait object
pub type AuditInstance = std::sync::Arc<dyn AuditSink>;
