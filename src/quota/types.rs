use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::UNLIMITED;

use super::error::QuotaError;

/// Closed enumeration of meterable resources.
///
/// `Users`, `Locations` and `StorageBytes` are standing-stock counters
/// (they can go up and down); the rest are monthly flow counters that are
/// only ever incremented and reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuotaType {
    Users,
    Locations,
    StorageBytes,
    Emails,
    Sms,
    Whatsapp,
    ApiCalls,
}

impl QuotaType {
    pub const ALL: [QuotaType; 7] = [
        QuotaType::Users,
        QuotaType::Locations,
        QuotaType::StorageBytes,
        QuotaType::Emails,
        QuotaType::Sms,
        QuotaType::Whatsapp,
        QuotaType::ApiCalls,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QuotaType::Users => "users",
            QuotaType::Locations => "locations",
            QuotaType::StorageBytes => "storageBytes",
            QuotaType::Emails => "emails",
            QuotaType::Sms => "sms",
            QuotaType::Whatsapp => "whatsapp",
            QuotaType::ApiCalls => "apiCalls",
        }
    }

    /// True for counters that represent current standing stock and may be
    /// decremented when the underlying resource is released.
    pub fn is_standing_stock(self) -> bool {
        matches!(
            self,
            QuotaType::Users | QuotaType::Locations | QuotaType::StorageBytes
        )
    }

    /// True for counters that accumulate within a month and are zeroed by
    /// the reset job.
    pub fn is_monthly_flow(self) -> bool {
        !self.is_standing_stock()
    }

    /// Column holding the counter the checker reads: the standing-stock
    /// column for stock types, the this-month column for flow types.
    pub(crate) fn counter_column(self) -> &'static str {
        match self {
            QuotaType::Users => "current_users",
            QuotaType::Locations => "current_locations",
            QuotaType::StorageBytes => "current_storage_bytes",
            QuotaType::Emails => "emails_sent_this_month",
            QuotaType::Sms => "sms_sent_this_month",
            QuotaType::Whatsapp => "whatsapp_sent_this_month",
            QuotaType::ApiCalls => "api_calls_this_month",
        }
    }

    /// Lifetime-total column bumped alongside the monthly counter, in the
    /// same statement. `None` for standing-stock types.
    pub(crate) fn lifetime_column(self) -> Option<&'static str> {
        match self {
            QuotaType::Emails => Some("total_emails_sent"),
            QuotaType::Sms => Some("total_sms_sent"),
            QuotaType::Whatsapp => Some("total_whatsapp_sent"),
            QuotaType::ApiCalls => Some("total_api_calls"),
            _ => None,
        }
    }
}

impl fmt::Display for QuotaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuotaType {
    type Err = QuotaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "users" => Ok(QuotaType::Users),
            "locations" => Ok(QuotaType::Locations),
            "storageBytes" => Ok(QuotaType::StorageBytes),
            "emails" => Ok(QuotaType::Emails),
            "sms" => Ok(QuotaType::Sms),
            "whatsapp" => Ok(QuotaType::Whatsapp),
            "apiCalls" => Ok(QuotaType::ApiCalls),
            other => Err(QuotaError::UnknownQuotaType(other.to_string())),
        }
    }
}

/// Resolved per-organization ceilings: the plan's values, with explicit
/// per-tenant overrides applied for users, locations and storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationLimits {
    pub plan: String,
    pub users: i64,
    pub locations: i64,
    pub storage_bytes: i64,
    pub emails: i64,
    pub sms: i64,
    pub whatsapp: i64,
    pub api_calls: i64,
}

impl OrganizationLimits {
    pub fn ceiling(&self, quota_type: QuotaType) -> i64 {
        match quota_type {
            QuotaType::Users => self.users,
            QuotaType::Locations => self.locations,
            QuotaType::StorageBytes => self.storage_bytes,
            QuotaType::Emails => self.emails,
            QuotaType::Sms => self.sms,
            QuotaType::Whatsapp => self.whatsapp,
            QuotaType::ApiCalls => self.api_calls,
        }
    }
}

/// Outcome of a quota check. Pure decision record; computing it reserves
/// nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaCheck {
    pub allowed: bool,
    pub current: i64,
    pub limit: i64,
    pub remaining: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl QuotaCheck {
    pub(crate) fn unlimited(current: i64) -> Self {
        Self {
            allowed: true,
            current,
            limit: UNLIMITED,
            remaining: UNLIMITED,
            message: None,
        }
    }

    pub(crate) fn bounded(quota_type: QuotaType, current: i64, limit: i64, increment: i64) -> Self {
        let allowed = current + increment <= limit;
        let message = if allowed {
            None
        } else {
            Some(format!(
                "quota {quota_type} exceeded: limit={limit}, current={current}"
            ))
        };
        Self {
            allowed,
            current,
            limit,
            remaining: (limit - current).max(0),
            message,
        }
    }
}

/// One gauge on the usage dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaGauge {
    pub current: i64,
    pub limit: i64,
    pub remaining: i64,
    pub percentage: u32,
    pub unlimited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_formatted: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_formatted: Option<String>,
}

impl QuotaGauge {
    pub(crate) fn new(current: i64, limit: i64) -> Self {
        let unlimited = limit == UNLIMITED;
        Self {
            current,
            limit,
            remaining: if unlimited {
                UNLIMITED
            } else {
                (limit - current).max(0)
            },
            percentage: percentage(current, limit),
            unlimited,
            current_formatted: None,
            limit_formatted: None,
        }
    }

    /// Adds human-readable byte renderings for byte-valued gauges.
    pub(crate) fn with_byte_format(mut self) -> Self {
        self.current_formatted = Some(format_bytes(self.current));
        self.limit_formatted = Some(if self.unlimited {
            "unlimited".to_string()
        } else {
            format_bytes(self.limit)
        });
        self
    }
}

/// Lifetime totals. The messaging totals move with the monthly counters;
/// reservations and revenue are fed by the booking flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageTotals {
    pub emails_sent: i64,
    pub sms_sent: i64,
    pub whatsapp_sent: i64,
    pub api_calls: i64,
    pub reservations: i64,
    pub revenue: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardQuotas {
    pub users: QuotaGauge,
    pub locations: QuotaGauge,
    pub storage: QuotaGauge,
    pub emails: QuotaGauge,
    pub sms: QuotaGauge,
    pub whatsapp: QuotaGauge,
    pub api_calls: QuotaGauge,
}

/// Human-facing view of an organization's consumption, derived from the
/// raw counters. Read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageDashboard {
    pub plan: String,
    pub quotas: DashboardQuotas,
    pub totals: UsageTotals,
    pub last_reset_date: Option<DateTime<Utc>>,
    pub last_updated_at: DateTime<Utc>,
}

fn percentage(current: i64, limit: i64) -> u32 {
    if limit == UNLIMITED {
        return 0;
    }
    if limit <= 0 {
        // A zero ceiling means nothing is available; the gauge reads full.
        return 100;
    }
    let pct = ((current.max(0) as f64 / limit as f64) * 100.0).round() as i64;
    pct.clamp(0, 100) as u32
}

/// Renders a byte count in a 1024-based human unit with two decimals.
pub fn format_bytes(bytes: i64) -> String {
    if bytes <= 0 {
        return "0 B".to_string();
    }
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let exp = (((bytes as f64).ln() / 1024_f64.ln()).floor() as usize).min(UNITS.len() - 1);
    let value = bytes as f64 / 1024_f64.powi(exp as i32);
    format!("{value:.2} {}", UNITS[exp])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_zero() {
        assert_eq!(format_bytes(0), "0 B");
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1_572_864), "1.50 MB");
        assert_eq!(format_bytes(1_073_741_824), "1.00 GB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024 * 1024), "5.00 TB");
    }

    #[test]
    fn quota_type_round_trips_through_str() {
        for quota_type in QuotaType::ALL {
            assert_eq!(quota_type.as_str().parse::<QuotaType>().ok(), Some(quota_type));
        }
    }

    #[test]
    fn unknown_quota_type_is_rejected() {
        let err = "gifts".parse::<QuotaType>().unwrap_err();
        assert!(matches!(err, QuotaError::UnknownQuotaType(ref s) if s == "gifts"));
    }

    #[test]
    fn percentage_clamps_at_100() {
        assert_eq!(percentage(150, 100), 100);
        assert_eq!(percentage(50, 100), 50);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(10, UNLIMITED), 0);
        assert_eq!(percentage(0, 0), 100);
    }

    #[test]
    fn bounded_check_denial_message_is_machine_parseable() {
        let check = QuotaCheck::bounded(QuotaType::Emails, 1_000, 1_000, 1);
        assert!(!check.allowed);
        assert_eq!(
            check.message.as_deref(),
            Some("quota emails exceeded: limit=1000, current=1000")
        );
    }
}
