pub mod error;
pub mod reset;
pub mod service;
pub mod types;

pub use error::QuotaError;
pub use reset::previous_month;
pub use service::QuotaService;
pub use types::{
    format_bytes, DashboardQuotas, OrganizationLimits, QuotaCheck, QuotaGauge, QuotaType,
    UsageDashboard, UsageTotals,
};
