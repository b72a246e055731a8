use thiserror::Error;

use crate::storage::StorageError;

use super::types::QuotaType;

/// Errors surfaced by the quota service.
///
/// Storage-layer transients propagate unchanged; retry policy belongs to
/// the caller.
#[derive(Debug, Error)]
pub enum QuotaError {
    /// The checker denied the requested increment. Carries structured
    /// fields so callers can render resource-specific upgrade prompts.
    #[error("quota {quota_type} exceeded: limit={limit}, current={current}")]
    QuotaExceeded {
        quota_type: QuotaType,
        current: i64,
        limit: i64,
    },
    #[error("tenant {0} not found")]
    TenantNotFound(String),
    /// A quota identifier outside the closed enumeration. Programming
    /// error on the caller's side; fails loudly.
    #[error("unknown quota type: {0}")]
    UnknownQuotaType(String),
    /// Decrement requested for a monthly flow counter. Flow counters are
    /// never decremented, only reset.
    #[error("cannot decrement flow counter {0}")]
    FlowCounterDecrement(QuotaType),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    /// The guarded action failed; no usage was committed for it.
    #[error("guarded action failed: {0}")]
    ActionFailed(anyhow::Error),
}
