//! The local-store variant end to end: session facade over JSON documents.

use std::sync::Arc;

use chrono::NaiveDate;
use tempfile::tempdir;
use tutora_core::{FixedClock, SchoolSession, SchoolStore, StudentDraft, StudentFilter};
use tutora_storage_json::JsonSchoolStore;

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 5, 15).unwrap()))
}

fn draft(first: &str, last: &str) -> StudentDraft {
    StudentDraft {
        first_name: first.into(),
        last_name: last.into(),
        level: "CM2".into(),
        subscription_month: "2024-03".into(),
        monthly_price: Some(50.0),
        ..StudentDraft::default()
    }
}

#[test]
fn state_survives_flush_and_reopen() {
    let dir = tempdir().expect("tempdir");
    let store: Arc<dyn SchoolStore> = Arc::new(JsonSchoolStore::new(dir.path()).expect("store"));

    let created = {
        let mut session =
            SchoolSession::open_with_clock(Arc::clone(&store), clock()).expect("open");
        let created = session.create_student(draft("Lina", "Moreau")).expect("create");
        session
            .toggle_payment(created.id, "2024-05".parse().unwrap())
            .expect("toggle");
        session.flush_now().expect("flush");
        created
    };

    let session = SchoolSession::open_with_clock(store, clock()).expect("reopen");
    let filter = StudentFilter::default();
    let listed: Vec<_> = session.list_students(&filter).collect();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, created.id);
    assert!(session
        .school()
        .payments
        .is_paid(created.id, "2024-05".parse().unwrap()));

    let stats = session.dashboard();
    assert_eq!(stats.paid_this_period, 1);
    assert_eq!(stats.total_revenue, 50.0);
    assert_eq!(stats.payment_rate, 100);
    // March and April were never paid.
    assert_eq!(stats.payments_overdue, 2);
    assert_eq!(session.overdue_entries().len(), 2);
}

#[test]
fn snapshot_round_trip_between_directories() {
    let dir = tempdir().expect("tempdir");
    let source: Arc<dyn SchoolStore> =
        Arc::new(JsonSchoolStore::new(dir.path().join("source")).expect("store"));
    let target: Arc<dyn SchoolStore> =
        Arc::new(JsonSchoolStore::new(dir.path().join("target")).expect("store"));

    let mut session =
        SchoolSession::open_with_clock(Arc::clone(&source), clock()).expect("open");
    let created = session.create_student(draft("Lina", "Moreau")).expect("create");
    session
        .toggle_payment(created.id, "2024-04".parse().unwrap())
        .expect("toggle");
    let snapshot = session.export_snapshot();

    let mut restored =
        SchoolSession::open_with_clock(Arc::clone(&target), clock()).expect("open target");
    restored.import_snapshot(&snapshot).expect("import");

    assert_eq!(restored.school().students, session.school().students);
    assert_eq!(restored.school().payments, session.school().payments);
}
