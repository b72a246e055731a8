use chrono::{DateTime, Datelike, TimeZone, Utc};
use tracing::{error, info};

use crate::storage::OrganizationUsage;

use super::error::QuotaError;
use super::service::QuotaService;

/// The (year, month) pair immediately before the given one, normalized
/// across the January boundary. Months are 1-12.
pub fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

impl QuotaService {
    /// Rolls the just-closed month into history and zeroes the monthly
    /// counters for every tenant not yet reset this calendar month.
    ///
    /// Idempotent within a month: the `last_reset_date` guard excludes
    /// tenants already reset, so a second run resets nothing. Invoked by
    /// an external scheduler; this crate does not schedule it.
    pub async fn reset_monthly_counters(&self) -> Result<usize, QuotaError> {
        self.reset_monthly_counters_at(Utc::now()).await
    }

    /// Clock-injectable variant of [`Self::reset_monthly_counters`].
    pub async fn reset_monthly_counters_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<usize, QuotaError> {
        let first_of_month = Utc
            .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
            .single()
            .expect("first day of the current month is a valid timestamp");

        let due = self.store().list_usage_due_for_reset(first_of_month)?;
        let (closed_year, closed_month) = previous_month(now.year(), now.month());

        let mut reset_count = 0usize;
        for usage in &due {
            // One tenant failing must not abort the rest of the batch.
            match self.reset_tenant(usage, closed_year, closed_month, now) {
                Ok(()) => reset_count += 1,
                Err(err) => {
                    error!(
                        tenant_id = %usage.tenant_id,
                        error = %err,
                        "monthly reset failed for tenant"
                    );
                }
            }
        }

        info!(
            eligible = due.len(),
            reset = reset_count,
            year = closed_year,
            month = closed_month,
            "monthly counter reset complete"
        );
        Ok(reset_count)
    }

    fn reset_tenant(
        &self,
        usage: &OrganizationUsage,
        closed_year: i32,
        closed_month: u32,
        now: DateTime<Utc>,
    ) -> Result<(), QuotaError> {
        self.store().upsert_history(usage, closed_year, closed_month)?;
        self.store().reset_monthly(&usage.tenant_id, now)?;
        Ok(())
    }
}
