use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use crate::config::QuotaConfig;
use crate::plan::{PlanTable, UNLIMITED};
use crate::storage::{StorageError, UsageStore};

use super::error::QuotaError;
use super::types::{
    DashboardQuotas, OrganizationLimits, QuotaCheck, QuotaGauge, QuotaType, UsageDashboard,
    UsageTotals,
};

const GIB: i64 = 1024 * 1024 * 1024;

/// Quota checking and usage metering for one deployment.
///
/// Stateless apart from the injected store and plan table; the subsystem
/// runs replicated with the database as the only point of serialization,
/// so nothing is cached in-process. Every entry point is `async` so
/// callers can bound it with their own timeout at the call boundary.
#[derive(Clone)]
pub struct QuotaService {
    store: Arc<UsageStore>,
    plans: Arc<PlanTable>,
}

impl QuotaService {
    pub fn new(store: Arc<UsageStore>, plans: Arc<PlanTable>) -> Self {
        Self { store, plans }
    }

    /// Opens the store under the configured data directory with the
    /// built-in plan table.
    pub fn from_config(config: &QuotaConfig) -> Result<Self> {
        let store = Arc::new(UsageStore::new(config.data_dir.clone())?);
        Ok(Self::new(store, Arc::new(PlanTable::default())))
    }

    pub fn store(&self) -> &UsageStore {
        &self.store
    }

    /// Plan ceilings merged with the tenant's explicit overrides. The
    /// storage override is kept in GB at rest and converted to bytes here.
    pub async fn resolve_limits(&self, tenant_id: &str) -> Result<OrganizationLimits, QuotaError> {
        let org = self
            .store
            .load_organization(tenant_id)?
            .ok_or_else(|| QuotaError::TenantNotFound(tenant_id.to_string()))?;

        let plan = self.plans.limits_for(&org.plan);

        // A NULL or zero override means "no override", matching how the
        // tenant records have always been written.
        Ok(OrganizationLimits {
            plan: org.plan,
            users: org.max_users.filter(|v| *v > 0).unwrap_or(plan.users),
            locations: org
                .max_locations
                .filter(|v| *v > 0)
                .unwrap_or(plan.locations),
            storage_bytes: org
                .max_storage_gb
                .filter(|v| *v > 0)
                .map(|gb| gb * GIB)
                .unwrap_or(plan.storage_bytes),
            emails: plan.emails,
            sms: plan.sms,
            whatsapp: plan.whatsapp,
            api_calls: plan.api_calls,
        })
    }

    /// Decides whether `increment` more units of `quota_type` are allowed.
    ///
    /// Pure decision over current state; reserves nothing. A concurrent
    /// caller can pass the same check before either commits.
    pub async fn check_quota(
        &self,
        tenant_id: &str,
        quota_type: QuotaType,
        increment: i64,
    ) -> Result<QuotaCheck, QuotaError> {
        let limits = self.resolve_limits(tenant_id).await?;
        let usage = self.store.get_or_create_usage(tenant_id)?;

        let current = usage.counter(quota_type);
        let limit = limits.ceiling(quota_type);

        if limit == UNLIMITED {
            return Ok(QuotaCheck::unlimited(current));
        }

        let check = QuotaCheck::bounded(quota_type, current, limit, increment);
        if !check.allowed {
            debug!(
                tenant_id,
                quota_type = %quota_type,
                current,
                limit,
                "quota check denied"
            );
        }
        Ok(check)
    }

    /// Commits an increment as a single atomic storage operation. For flow
    /// types the lifetime total moves in the same statement.
    pub async fn increment_usage(
        &self,
        tenant_id: &str,
        quota_type: QuotaType,
        amount: i64,
    ) -> Result<(), QuotaError> {
        self.store.increment_usage(tenant_id, quota_type, amount)?;
        Ok(())
    }

    /// Decrements a standing-stock counter when the underlying resource is
    /// released. Flow counters are never decremented, only reset.
    pub async fn decrement_usage(
        &self,
        tenant_id: &str,
        quota_type: QuotaType,
        amount: i64,
    ) -> Result<(), QuotaError> {
        if !quota_type.is_standing_stock() {
            return Err(QuotaError::FlowCounterDecrement(quota_type));
        }
        self.store
            .decrement_usage(tenant_id, quota_type, amount)
            .map_err(|err| match err {
                StorageError::TenantNotFound(id) => QuotaError::TenantNotFound(id),
                other => QuotaError::Storage(other),
            })?;
        Ok(())
    }

    /// Check, perform, commit: denies before running the action, and only
    /// commits the increment once the action has succeeded. A failed
    /// action is never charged.
    ///
    /// The composition is check-then-act across two storage round trips
    /// and is deliberately not atomic: N concurrent callers at
    /// `limit - increment` can overshoot the ceiling by up to N - 1
    /// increments. Acceptable for flow counters; do not rely on it where
    /// hard enforcement is required.
    pub async fn with_quota_check<T, F, Fut>(
        &self,
        tenant_id: &str,
        quota_type: QuotaType,
        increment: i64,
        action: F,
    ) -> Result<T, QuotaError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let check = self.check_quota(tenant_id, quota_type, increment).await?;
        if !check.allowed {
            warn!(
                tenant_id,
                quota_type = %quota_type,
                current = check.current,
                limit = check.limit,
                "action blocked by quota"
            );
            return Err(QuotaError::QuotaExceeded {
                quota_type,
                current: check.current,
                limit: check.limit,
            });
        }

        let result = action().await.map_err(QuotaError::ActionFailed)?;

        self.increment_usage(tenant_id, quota_type, increment).await?;
        Ok(result)
    }

    /// Derives the per-quota gauges and lifetime totals for display.
    pub async fn usage_dashboard(&self, tenant_id: &str) -> Result<UsageDashboard, QuotaError> {
        let limits = self.resolve_limits(tenant_id).await?;
        let usage = self.store.get_or_create_usage(tenant_id)?;

        let gauge = |quota_type: QuotaType| {
            QuotaGauge::new(usage.counter(quota_type), limits.ceiling(quota_type))
        };

        let dashboard = UsageDashboard {
            plan: limits.plan.clone(),
            quotas: DashboardQuotas {
                users: gauge(QuotaType::Users),
                locations: gauge(QuotaType::Locations),
                storage: gauge(QuotaType::StorageBytes).with_byte_format(),
                emails: gauge(QuotaType::Emails),
                sms: gauge(QuotaType::Sms),
                whatsapp: gauge(QuotaType::Whatsapp),
                api_calls: gauge(QuotaType::ApiCalls),
            },
            totals: UsageTotals {
                emails_sent: usage.total_emails_sent,
                sms_sent: usage.total_sms_sent,
                whatsapp_sent: usage.total_whatsapp_sent,
                api_calls: usage.total_api_calls,
                reservations: usage.total_reservations,
                revenue: usage.total_revenue,
            },
            last_reset_date: usage.last_reset_date,
            last_updated_at: usage.last_updated_at,
        };

        debug!(tenant_id, plan = %dashboard.plan, "usage dashboard computed");
        Ok(dashboard)
    }
}
