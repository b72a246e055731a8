use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::quota::QuotaType;

use super::error::StorageError;
use super::schema::init_database;
use super::USAGE_DB_FILENAME;

/// Tenant record as the resolver sees it: the plan identifier plus the
/// three explicit per-tenant overrides. Collaborators own its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationRecord {
    pub tenant_id: String,
    pub plan: String,
    pub max_users: Option<i64>,
    pub max_locations: Option<i64>,
    /// Stored in GB; converted to bytes at resolution time.
    pub max_storage_gb: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The per-tenant usage row. Exactly one per tenant, created lazily on
/// first access and never deleted by this subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationUsage {
    pub tenant_id: String,
    pub current_users: i64,
    pub current_locations: i64,
    pub current_storage_bytes: i64,
    pub emails_sent_this_month: i64,
    pub sms_sent_this_month: i64,
    pub whatsapp_sent_this_month: i64,
    pub api_calls_this_month: i64,
    pub total_emails_sent: i64,
    pub total_sms_sent: i64,
    pub total_whatsapp_sent: i64,
    pub total_api_calls: i64,
    pub total_reservations: i64,
    pub total_revenue: f64,
    pub last_reset_date: Option<DateTime<Utc>>,
    pub last_updated_at: DateTime<Utc>,
}

impl OrganizationUsage {
    /// The counter the checker compares against a ceiling: standing stock
    /// for users/locations/storage, the this-month counter for flow types.
    pub fn counter(&self, quota_type: QuotaType) -> i64 {
        match quota_type {
            QuotaType::Users => self.current_users,
            QuotaType::Locations => self.current_locations,
            QuotaType::StorageBytes => self.current_storage_bytes,
            QuotaType::Emails => self.emails_sent_this_month,
            QuotaType::Sms => self.sms_sent_this_month,
            QuotaType::Whatsapp => self.whatsapp_sent_this_month,
            QuotaType::ApiCalls => self.api_calls_this_month,
        }
    }
}

/// Closed-month snapshot, at most one row per (tenant, year, month).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageHistoryRecord {
    pub tenant_id: String,
    pub year: i32,
    pub month: u32,
    pub users_count: i64,
    pub locations_count: i64,
    pub storage_bytes: i64,
    pub emails_sent: i64,
    pub sms_sent: i64,
    pub whatsapp_sent: i64,
    pub api_calls: i64,
}

const USAGE_COLUMNS: &str = "tenant_id, current_users, current_locations, current_storage_bytes, \
     emails_sent_this_month, sms_sent_this_month, whatsapp_sent_this_month, api_calls_this_month, \
     total_emails_sent, total_sms_sent, total_whatsapp_sent, total_api_calls, \
     total_reservations, total_revenue, last_reset_date, last_updated_at";

/// SQLite-backed usage store. The database is the only point of
/// serialization between replicas; every counter mutation here is a single
/// statement, never read-modify-write in application code.
pub struct UsageStore {
    conn: Mutex<Connection>,
}

impl UsageStore {
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;
        let db_path = data_dir.join(USAGE_DB_FILENAME);
        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        init_database(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    pub fn upsert_organization(
        &self,
        tenant_id: &str,
        plan: &str,
        max_users: Option<i64>,
        max_locations: Option<i64>,
        max_storage_gb: Option<i64>,
    ) -> Result<(), StorageError> {
        if tenant_id.trim().is_empty() {
            return Err(StorageError::InvalidValue(
                "tenant_id cannot be empty".into(),
            ));
        }

        let conn = self.lock()?;
        let now = Utc::now();
        conn.execute(
            r#"
            INSERT INTO organizations (tenant_id, plan, max_users, max_locations, max_storage_gb, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT(tenant_id) DO UPDATE SET
                plan = excluded.plan,
                max_users = excluded.max_users,
                max_locations = excluded.max_locations,
                max_storage_gb = excluded.max_storage_gb,
                updated_at = excluded.updated_at
            "#,
            params![tenant_id, plan, max_users, max_locations, max_storage_gb, now],
        )?;

        Ok(())
    }

    pub fn load_organization(
        &self,
        tenant_id: &str,
    ) -> Result<Option<OrganizationRecord>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT tenant_id, plan, max_users, max_locations, max_storage_gb, created_at, updated_at
            FROM organizations
            WHERE tenant_id = ?1
            "#,
        )?;

        let record = stmt
            .query_row(params![tenant_id], |row| {
                Ok(OrganizationRecord {
                    tenant_id: row.get(0)?,
                    plan: row.get(1)?,
                    max_users: row.get(2)?,
                    max_locations: row.get(3)?,
                    max_storage_gb: row.get(4)?,
                    created_at: row.get(5)?,
                    updated_at: row.get(6)?,
                })
            })
            .optional()?;

        Ok(record)
    }

    /// Insert-if-absent then read, both under the storage layer's own
    /// serialization. Concurrent first access for the same tenant yields
    /// exactly one row.
    pub fn get_or_create_usage(
        &self,
        tenant_id: &str,
    ) -> Result<OrganizationUsage, StorageError> {
        if tenant_id.trim().is_empty() {
            return Err(StorageError::InvalidValue(
                "tenant_id cannot be empty".into(),
            ));
        }

        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO organization_usage (tenant_id, last_updated_at) VALUES (?1, ?2)",
            params![tenant_id, Utc::now()],
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {USAGE_COLUMNS} FROM organization_usage WHERE tenant_id = ?1"
        ))?;
        let usage = stmt.query_row(params![tenant_id], map_usage_row)?;
        Ok(usage)
    }

    /// Applies an increment as one upsert. For monthly flow types the
    /// lifetime total moves in the same statement, so the two counters can
    /// never be observed out of sync.
    pub fn increment_usage(
        &self,
        tenant_id: &str,
        quota_type: QuotaType,
        amount: i64,
    ) -> Result<(), StorageError> {
        if amount <= 0 {
            return Err(StorageError::InvalidValue(
                "increment amount must be greater than zero".into(),
            ));
        }

        let column = quota_type.counter_column();
        let sql = match quota_type.lifetime_column() {
            Some(total) => format!(
                r#"
                INSERT INTO organization_usage (tenant_id, {column}, {total}, last_updated_at)
                VALUES (?1, ?2, ?2, ?3)
                ON CONFLICT(tenant_id) DO UPDATE SET
                    {column} = {column} + excluded.{column},
                    {total} = {total} + excluded.{total},
                    last_updated_at = excluded.last_updated_at
                "#
            ),
            None => format!(
                r#"
                INSERT INTO organization_usage (tenant_id, {column}, last_updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(tenant_id) DO UPDATE SET
                    {column} = {column} + excluded.{column},
                    last_updated_at = excluded.last_updated_at
                "#
            ),
        };

        let conn = self.lock()?;
        conn.execute(&sql, params![tenant_id, amount, Utc::now()])?;
        Ok(())
    }

    /// Single-statement decrement for standing-stock counters. The service
    /// layer rejects flow types before this is reached. Fails loudly when
    /// the tenant has no usage row; releasing a resource that was never
    /// counted is a caller bug.
    pub fn decrement_usage(
        &self,
        tenant_id: &str,
        quota_type: QuotaType,
        amount: i64,
    ) -> Result<(), StorageError> {
        if amount <= 0 {
            return Err(StorageError::InvalidValue(
                "decrement amount must be greater than zero".into(),
            ));
        }

        let column = quota_type.counter_column();
        let sql = format!(
            "UPDATE organization_usage SET {column} = {column} - ?2, last_updated_at = ?3 \
             WHERE tenant_id = ?1"
        );

        let conn = self.lock()?;
        let updated = conn.execute(&sql, params![tenant_id, amount, Utc::now()])?;
        if updated == 0 {
            return Err(StorageError::TenantNotFound(tenant_id.to_string()));
        }
        Ok(())
    }

    /// Business totals fed by the booking flow, not by the quota mutators.
    pub fn record_business_totals(
        &self,
        tenant_id: &str,
        reservations: i64,
        revenue: f64,
    ) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO organization_usage (tenant_id, total_reservations, total_revenue, last_updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(tenant_id) DO UPDATE SET
                total_reservations = total_reservations + excluded.total_reservations,
                total_revenue = total_revenue + excluded.total_revenue,
                last_updated_at = excluded.last_updated_at
            "#,
            params![tenant_id, reservations, revenue, Utc::now()],
        )?;
        Ok(())
    }

    /// Usage rows whose monthly counters have not been reset since the
    /// given cutoff (or ever).
    pub fn list_usage_due_for_reset(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<OrganizationUsage>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {USAGE_COLUMNS} FROM organization_usage \
             WHERE last_reset_date IS NULL OR last_reset_date < ?1 \
             ORDER BY tenant_id"
        ))?;

        let rows = stmt.query_map(params![cutoff], map_usage_row)?;
        let mut due = Vec::new();
        for row in rows {
            due.push(row?);
        }
        Ok(due)
    }

    /// Writes the closed-month snapshot. Keyed on (tenant, year, month);
    /// a second write for the same key overwrites, never duplicates.
    pub fn upsert_history(
        &self,
        usage: &OrganizationUsage,
        year: i32,
        month: u32,
    ) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO organization_usage_history
                (tenant_id, year, month, users_count, locations_count, storage_bytes,
                 emails_sent, sms_sent, whatsapp_sent, api_calls)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(tenant_id, year, month) DO UPDATE SET
                users_count = excluded.users_count,
                locations_count = excluded.locations_count,
                storage_bytes = excluded.storage_bytes,
                emails_sent = excluded.emails_sent,
                sms_sent = excluded.sms_sent,
                whatsapp_sent = excluded.whatsapp_sent,
                api_calls = excluded.api_calls
            "#,
            params![
                usage.tenant_id,
                year,
                month,
                usage.current_users,
                usage.current_locations,
                usage.current_storage_bytes,
                usage.emails_sent_this_month,
                usage.sms_sent_this_month,
                usage.whatsapp_sent_this_month,
                usage.api_calls_this_month,
            ],
        )?;
        Ok(())
    }

    pub fn load_history(
        &self,
        tenant_id: &str,
        year: i32,
        month: u32,
    ) -> Result<Option<UsageHistoryRecord>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT tenant_id, year, month, users_count, locations_count, storage_bytes,
                   emails_sent, sms_sent, whatsapp_sent, api_calls
            FROM organization_usage_history
            WHERE tenant_id = ?1 AND year = ?2 AND month = ?3
            "#,
        )?;

        let record = stmt
            .query_row(params![tenant_id, year, month], |row| {
                Ok(UsageHistoryRecord {
                    tenant_id: row.get(0)?,
                    year: row.get(1)?,
                    month: row.get(2)?,
                    users_count: row.get(3)?,
                    locations_count: row.get(4)?,
                    storage_bytes: row.get(5)?,
                    emails_sent: row.get(6)?,
                    sms_sent: row.get(7)?,
                    whatsapp_sent: row.get(8)?,
                    api_calls: row.get(9)?,
                })
            })
            .optional()?;

        Ok(record)
    }

    /// Zeroes the four monthly counters and stamps the reset date in one
    /// atomic statement. An increment racing this lands either pre- or
    /// post-reset but is never dropped.
    pub fn reset_monthly(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            UPDATE organization_usage SET
                emails_sent_this_month = 0,
                sms_sent_this_month = 0,
                whatsapp_sent_this_month = 0,
                api_calls_this_month = 0,
                last_reset_date = ?2,
                last_updated_at = ?2
            WHERE tenant_id = ?1
            "#,
            params![tenant_id, now],
        )?;
        Ok(())
    }
}

fn map_usage_row(row: &Row<'_>) -> rusqlite::Result<OrganizationUsage> {
    Ok(OrganizationUsage {
        tenant_id: row.get(0)?,
        current_users: row.get(1)?,
        current_locations: row.get(2)?,
        current_storage_bytes: row.get(3)?,
        emails_sent_this_month: row.get(4)?,
        sms_sent_this_month: row.get(5)?,
        whatsapp_sent_this_month: row.get(6)?,
        api_calls_this_month: row.get(7)?,
        total_emails_sent: row.get(8)?,
        total_sms_sent: row.get(9)?,
        total_whatsapp_sent: row.get(10)?,
        total_api_calls: row.get(11)?,
        total_reservations: row.get(12)?,
        total_revenue: row.get(13)?,
        last_reset_date: row.get(14)?,
        last_updated_at: row.get(15)?,
    })
}
