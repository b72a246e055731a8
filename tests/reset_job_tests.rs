//! Integration tests for the monthly rollover job.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use org_quota::plan::PlanTable;
use org_quota::quota::{QuotaService, QuotaType};
use org_quota::storage::UsageStore;
use tempfile::TempDir;

fn service() -> (QuotaService, Arc<UsageStore>, TempDir) {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(UsageStore::new(dir.path().to_path_buf()).expect("open store"));
    let service = QuotaService::new(Arc::clone(&store), Arc::new(PlanTable::default()));
    (service, store, dir)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn seed_tenant(store: &UsageStore, tenant_id: &str, plan: &str) {
    store
        .upsert_organization(tenant_id, plan, None, None, None)
        .expect("seed tenant");
}

#[tokio::test]
async fn test_reset_snapshots_history_and_zeroes_monthly_counters() {
    let (service, store, _dir) = service();
    seed_tenant(&store, "org-1", "TEAM");

    service
        .increment_usage("org-1", QuotaType::Emails, 42)
        .await
        .expect("increment");
    service
        .increment_usage("org-1", QuotaType::Sms, 7)
        .await
        .expect("increment");
    service
        .increment_usage("org-1", QuotaType::ApiCalls, 10)
        .await
        .expect("increment");
    service
        .increment_usage("org-1", QuotaType::Users, 2)
        .await
        .expect("increment");

    let march = Utc.with_ymd_and_hms(2025, 3, 15, 10, 0, 0).unwrap();
    let reset = service
        .reset_monthly_counters_at(march)
        .await
        .expect("reset");
    assert_eq!(reset, 1);

    // The just-closed month is February.
    let history = store
        .load_history("org-1", 2025, 2)
        .expect("load history")
        .expect("history row");
    assert_eq!(history.emails_sent, 42);
    assert_eq!(history.sms_sent, 7);
    assert_eq!(history.api_calls, 10);
    assert_eq!(history.users_count, 2);

    let dashboard = service.usage_dashboard("org-1").await.expect("dashboard");
    assert_eq!(dashboard.quotas.emails.current, 0);
    assert_eq!(dashboard.quotas.sms.current, 0);
    assert_eq!(dashboard.quotas.api_calls.current, 0);
    // Standing stock and lifetime totals survive the reset.
    assert_eq!(dashboard.quotas.users.current, 2);
    assert_eq!(dashboard.totals.emails_sent, 42);
    assert!(dashboard.last_reset_date.is_some());
}

#[tokio::test]
async fn test_reset_is_idempotent_within_a_month() {
    let (service, store, _dir) = service();
    seed_tenant(&store, "org-1", "TEAM");
    service
        .increment_usage("org-1", QuotaType::Emails, 5)
        .await
        .expect("increment");

    let mid_march = Utc.with_ymd_and_hms(2025, 3, 15, 10, 0, 0).unwrap();
    assert_eq!(
        service
            .reset_monthly_counters_at(mid_march)
            .await
            .expect("reset"),
        1
    );

    // Second run in the same month finds nothing eligible and must not
    // overwrite February's snapshot with zeroes.
    let late_march = Utc.with_ymd_and_hms(2025, 3, 28, 9, 0, 0).unwrap();
    assert_eq!(
        service
            .reset_monthly_counters_at(late_march)
            .await
            .expect("reset"),
        0
    );

    let history = store
        .load_history("org-1", 2025, 2)
        .expect("load history")
        .expect("history row");
    assert_eq!(history.emails_sent, 5);
}

#[tokio::test]
async fn test_tenant_is_due_again_next_month() {
    let (service, store, _dir) = service();
    seed_tenant(&store, "org-1", "TEAM");
    service
        .increment_usage("org-1", QuotaType::Emails, 5)
        .await
        .expect("increment");

    let march = Utc.with_ymd_and_hms(2025, 3, 15, 10, 0, 0).unwrap();
    assert_eq!(
        service
            .reset_monthly_counters_at(march)
            .await
            .expect("reset"),
        1
    );

    service
        .increment_usage("org-1", QuotaType::Emails, 11)
        .await
        .expect("increment");

    let april = Utc.with_ymd_and_hms(2025, 4, 2, 3, 0, 0).unwrap();
    assert_eq!(
        service
            .reset_monthly_counters_at(april)
            .await
            .expect("reset"),
        1
    );

    let history = store
        .load_history("org-1", 2025, 3)
        .expect("load history")
        .expect("history row");
    assert_eq!(history.emails_sent, 11);

    let dashboard = service.usage_dashboard("org-1").await.expect("dashboard");
    assert_eq!(dashboard.quotas.emails.current, 0);
    assert_eq!(dashboard.totals.emails_sent, 16);
}

#[tokio::test]
async fn test_january_reset_closes_december_of_previous_year() {
    let (service, store, _dir) = service();
    seed_tenant(&store, "org-1", "TEAM");
    service
        .increment_usage("org-1", QuotaType::Emails, 9)
        .await
        .expect("increment");

    let january = Utc.with_ymd_and_hms(2026, 1, 5, 0, 30, 0).unwrap();
    assert_eq!(
        service
            .reset_monthly_counters_at(january)
            .await
            .expect("reset"),
        1
    );

    let history = store
        .load_history("org-1", 2025, 12)
        .expect("load history")
        .expect("history row");
    assert_eq!(history.emails_sent, 9);
}

#[tokio::test]
async fn test_reset_covers_every_eligible_tenant() {
    let (service, _store, _dir) = service();

    for tenant in ["org-a", "org-b", "org-c"] {
        service
            .increment_usage(tenant, QuotaType::ApiCalls, 1)
            .await
            .expect("increment");
    }

    let now = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
    assert_eq!(
        service.reset_monthly_counters_at(now).await.expect("reset"),
        3
    );
    assert_eq!(
        service.reset_monthly_counters_at(now).await.expect("reset"),
        0
    );
}

#[tokio::test]
async fn test_reset_with_no_usage_rows_is_a_noop() {
    let (service, _store, _dir) = service();
    assert_eq!(service.reset_monthly_counters().await.expect("reset"), 0);
}
