use anyhow::Result;
use rusqlite::Connection;

pub const ORGANIZATIONS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS organizations (
    tenant_id TEXT PRIMARY KEY,
    plan TEXT NOT NULL,
    max_users INTEGER,
    max_locations INTEGER,
    max_storage_gb INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

pub const ORGANIZATION_USAGE_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS organization_usage (
    tenant_id TEXT PRIMARY KEY,
    current_users INTEGER NOT NULL DEFAULT 0,
    current_locations INTEGER NOT NULL DEFAULT 0,
    current_storage_bytes INTEGER NOT NULL DEFAULT 0,
    emails_sent_this_month INTEGER NOT NULL DEFAULT 0,
    sms_sent_this_month INTEGER NOT NULL DEFAULT 0,
    whatsapp_sent_this_month INTEGER NOT NULL DEFAULT 0,
    api_calls_this_month INTEGER NOT NULL DEFAULT 0,
    total_emails_sent INTEGER NOT NULL DEFAULT 0,
    total_sms_sent INTEGER NOT NULL DEFAULT 0,
    total_whatsapp_sent INTEGER NOT NULL DEFAULT 0,
    total_api_calls INTEGER NOT NULL DEFAULT 0,
    total_reservations INTEGER NOT NULL DEFAULT 0,
    total_revenue REAL NOT NULL DEFAULT 0,
    last_reset_date TEXT,
    last_updated_at TEXT NOT NULL
);
"#;

pub const ORGANIZATION_USAGE_HISTORY_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS organization_usage_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id TEXT NOT NULL,
    year INTEGER NOT NULL,
    month INTEGER NOT NULL,
    users_count INTEGER NOT NULL DEFAULT 0,
    locations_count INTEGER NOT NULL DEFAULT 0,
    storage_bytes INTEGER NOT NULL DEFAULT 0,
    emails_sent INTEGER NOT NULL DEFAULT 0,
    sms_sent INTEGER NOT NULL DEFAULT 0,
    whatsapp_sent INTEGER NOT NULL DEFAULT 0,
    api_calls INTEGER NOT NULL DEFAULT 0,
    UNIQUE(tenant_id, year, month)
);
"#;

pub const USAGE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_usage_last_reset ON organization_usage(last_reset_date);
CREATE INDEX IF NOT EXISTS idx_history_tenant ON organization_usage_history(tenant_id, year, month);
"#;

pub fn init_database(conn: &Connection) -> Result<()> {
    conn.execute_batch(ORGANIZATIONS_TABLE_SCHEMA)?;
    conn.execute_batch(ORGANIZATION_USAGE_TABLE_SCHEMA)?;
    conn.execute_batch(ORGANIZATION_USAGE_HISTORY_TABLE_SCHEMA)?;
    conn.execute_batch(USAGE_INDEXES)?;
    Ok(())
}
