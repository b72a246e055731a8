//! Multi-tenant quota enforcement and usage metering.
//!
//! Tracks how much of each billable resource an organization has consumed,
//! enforces plan-defined ceilings before an action is allowed, and rolls
//! monthly counters into historical records. The crate is consumed
//! in-process by the API layer; it exposes no network surface of its own.
//!
//! The SQLite store is the only point of serialization: every counter
//! mutation is a single atomic statement, and the check-then-act wrapper
//! ([`QuotaService::with_quota_check`]) is documented soft-limit only.

pub mod config;
pub mod plan;
pub mod quota;
pub mod storage;

pub use config::QuotaConfig;
pub use plan::{PlanLimits, PlanTable, UNLIMITED};
pub use quota::{
    format_bytes, OrganizationLimits, QuotaCheck, QuotaError, QuotaService, QuotaType,
    UsageDashboard,
};
pub use storage::{StorageError, UsageStore};
