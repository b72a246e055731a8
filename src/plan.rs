use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::quota::QuotaType;

/// Ceiling value meaning "no limit" for a quota type.
pub const UNLIMITED: i64 = -1;

/// Plan used when an organization carries a plan identifier the table does
/// not know. Falling back keeps the system available when plan metadata is
/// stale, at the most restrictive ceilings.
pub const FALLBACK_PLAN: &str = "SOLO";

const GIB: i64 = 1024 * 1024 * 1024;

/// Per-plan ceilings, one per quota type. A value of [`UNLIMITED`] disables
/// enforcement for that type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub users: i64,
    pub locations: i64,
    pub storage_bytes: i64,
    pub emails: i64,
    pub sms: i64,
    pub whatsapp: i64,
    pub api_calls: i64,
}

impl PlanLimits {
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

/// Immutable plan-to-ceiling registry.
///
/// Built once at startup and injected wherever limits are resolved, so
/// tests can substitute alternate tables.
#[derive(Debug, Clone)]
pub struct PlanTable {
    plans: BTreeMap<String, PlanLimits>,
}

impl Default for PlanTable {
    fn default() -> Self {
        let mut plans = BTreeMap::new();
        // Solo tier: single practitioner, no SMS allowance.
        plans.insert(
            "SOLO".to_string(),
            PlanLimits {
                users: 1,
                locations: 1,
                storage_bytes: 5 * GIB,
                emails: 1_000,
                sms: 0,
                whatsapp: 200,
                api_calls: 10_000,
            },
        );
        plans.insert(
            "DUO".to_string(),
            PlanLimits {
                users: 3,
                locations: 1,
                storage_bytes: 15 * GIB,
                emails: 2_000,
                sms: 0,
                whatsapp: 500,
                api_calls: 25_000,
            },
        );
        plans.insert(
            "TEAM".to_string(),
            PlanLimits {
                users: 8,
                locations: 3,
                storage_bytes: 30 * GIB,
                emails: 5_000,
                sms: 200,
                whatsapp: 1_000,
                api_calls: 50_000,
            },
        );
        plans.insert(
            "PREMIUM".to_string(),
            PlanLimits {
                users: UNLIMITED,
                locations: UNLIMITED,
                storage_bytes: UNLIMITED,
                emails: UNLIMITED,
                sms: 1_000,
                whatsapp: UNLIMITED,
                api_calls: UNLIMITED,
            },
        );
        plans.insert(
            "ENTERPRISE".to_string(),
            PlanLimits {
                users: UNLIMITED,
                locations: UNLIMITED,
                storage_bytes: UNLIMITED,
                emails: UNLIMITED,
                sms: UNLIMITED,
                whatsapp: UNLIMITED,
                api_calls: UNLIMITED,
            },
        );
        Self { plans }
    }
}

impl PlanTable {
    /// Builds a table from an explicit plan map. The fallback plan must be
    /// present, otherwise unknown plan identifiers could not resolve.
    pub fn new(plans: BTreeMap<String, PlanLimits>) -> Result<Self> {
        if !plans.contains_key(FALLBACK_PLAN) {
            anyhow::bail!("plan table must define the fallback plan {FALLBACK_PLAN}");
        }
        Ok(Self { plans })
    }

    /// Ceilings for the given plan identifier, falling back to
    /// [`FALLBACK_PLAN`] when the identifier is unknown.
    pub fn limits_for(&self, plan: &str) -> &PlanLimits {
        self.plans.get(plan).unwrap_or_else(|| &self.plans[FALLBACK_PLAN])
    }

    pub fn contains(&self, plan: &str) -> bool {
        self.plans.contains_key(plan)
    }

    pub fn plan_names(&self) -> impl Iterator<Item = &str> {
        self.plans.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_plan_defines_every_quota_type() {
        let table = PlanTable::default();
        for plan in ["SOLO", "DUO", "TEAM", "PREMIUM", "ENTERPRISE"] {
            assert!(table.contains(plan), "missing plan {plan}");
            let limits = table.limits_for(plan);
            for quota_type in QuotaType::ALL {
                // Ceilings are either unlimited or non-negative; a hole in
                // the table would show up here as a nonsense value.
                assert!(
                    limits.ceiling(quota_type) >= UNLIMITED,
                    "plan {plan} has no usable ceiling for {quota_type}"
                );
            }
        }
    }

    #[test]
    fn unknown_plan_falls_back_to_most_restrictive_tier() {
        let table = PlanTable::default();
        let fallback = table.limits_for("LEGACY_GOLD");
        assert_eq!(fallback, table.limits_for(FALLBACK_PLAN));
        assert_eq!(fallback.users, 1);
        assert_eq!(fallback.locations, 1);
        assert_eq!(fallback.storage_bytes, 5 * GIB);
        assert_eq!(fallback.emails, 1_000);
        assert_eq!(fallback.sms, 0);
        assert_eq!(fallback.whatsapp, 200);
        assert_eq!(fallback.api_calls, 10_000);
    }

    #[test]
    fn enterprise_plan_is_unlimited_everywhere() {
        let table = PlanTable::default();
        let limits = table.limits_for("ENTERPRISE");
        for quota_type in QuotaType::ALL {
            assert_eq!(limits.ceiling(quota_type), UNLIMITED);
        }
    }

    #[test]
    fn custom_table_requires_fallback_plan() {
        let mut plans = BTreeMap::new();
        plans.insert(
            "ONLY".to_string(),
            PlanLimits {
                users: 1,
                locations: 1,
                storage_bytes: GIB,
                emails: 10,
                sms: 0,
                whatsapp: 0,
                api_calls: 100,
            },
        );
        assert!(PlanTable::new(plans).is_err());
    }
}
