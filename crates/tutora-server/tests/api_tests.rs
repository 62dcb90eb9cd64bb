use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use tower::ServiceExt;
use tutora_core::FixedClock;
use tutora_server::{router, AppState};
use tutora_storage_sqlite::SqliteSchoolStore;

fn app() -> Router {
    let store = SqliteSchoolStore::open_in_memory().expect("open store");
    let clock = FixedClock(NaiveDate::from_ymd_opt(2024, 5, 15).unwrap());
    router(AppState::new(Arc::new(store), Arc::new(clock)))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(value) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .expect("request"),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request"),
    };
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

fn lina_payload() -> Value {
    json!({
        "firstName": "Lina",
        "lastName": "Moreau",
        "email": "lina@example.com",
        "level": "CM2",
        "subscriptionMonth": "2024-03",
        "price": 50.0
    })
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app();
    let (status, body) = send(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn create_returns_created_record_with_seeded_payments() {
    let app = app();
    let (status, body) = send(&app, "POST", "/api/students", Some(lina_payload())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["firstName"], "Lina");
    assert_eq!(body["level"], "CM2");
    assert_eq!(body["registrationDate"], "2024-05-15");

    let payments = body["payments"].as_object().expect("payments map");
    // Subscription month through current + 2 months lookahead.
    for period in ["2024-03", "2024-04", "2024-05", "2024-06", "2024-07"] {
        assert_eq!(payments[period], false, "period {period} seeded unpaid");
    }
}

#[tokio::test]
async fn create_lists_missing_fields() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/students",
        Some(json!({"firstName": "Lina"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
    let fields: Vec<String> = body["fields"]
        .as_array()
        .expect("fields list")
        .iter()
        .map(|field| field.as_str().unwrap().to_string())
        .collect();
    assert_eq!(fields, ["last_name", "level", "subscription_month"]);
}

#[tokio::test]
async fn duplicate_email_reports_email_field() {
    let app = app();
    send(&app, "POST", "/api/students", Some(lina_payload())).await;
    let mut second = lina_payload();
    second["firstName"] = json!("Noah");
    let (status, body) = send(&app, "POST", "/api/students", Some(second)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
    assert_eq!(body["fields"], json!(["email"]));
}

#[tokio::test]
async fn update_preserves_identity_and_404s_on_unknown() {
    let app = app();
    let (_, created) = send(&app, "POST", "/api/students", Some(lina_payload())).await;
    let id = created["id"].as_str().expect("id").to_string();

    let mut changed = lina_payload();
    changed["lastName"] = json!("Durand");
    let (status, updated) =
        send(&app, "PUT", &format!("/api/students/{id}"), Some(changed.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["lastName"], "Durand");
    assert_eq!(updated["id"], created["id"]);
    assert_eq!(updated["registrationDate"], created["registrationDate"]);

    let ghost = uuid::Uuid::new_v4();
    let (status, body) =
        send(&app, "PUT", &format!("/api/students/{ghost}"), Some(changed)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn delete_removes_student_and_404s_after() {
    let app = app();
    let (_, created) = send(&app, "POST", "/api/students", Some(lina_payload())).await;
    let id = created["id"].as_str().expect("id").to_string();

    let (status, _) = send(&app, "DELETE", &format!("/api/students/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "DELETE", &format!("/api/students/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, listed) = send(&app, "GET", "/api/students", None).await;
    assert_eq!(listed.as_array().expect("list").len(), 0);
}

#[tokio::test]
async fn list_filters_by_search_and_status() {
    let app = app();
    send(&app, "POST", "/api/students", Some(lina_payload())).await;
    let mut inactive = json!({
        "firstName": "Noah",
        "lastName": "Petit",
        "level": "CP",
        "subscriptionMonth": "2024-04",
        "status": "inactive"
    });
    send(&app, "POST", "/api/students", Some(inactive.take())).await;

    // Default listing is active students only.
    let (_, listed) = send(&app, "GET", "/api/students", None).await;
    assert_eq!(listed.as_array().expect("list").len(), 1);
    assert_eq!(listed[0]["firstName"], "Lina");

    let (_, all) = send(&app, "GET", "/api/students?status=all", None).await;
    assert_eq!(all.as_array().expect("list").len(), 2);

    let (_, searched) = send(&app, "GET", "/api/students?search=moreau&status=all", None).await;
    assert_eq!(searched.as_array().expect("list").len(), 1);

    let (_, by_level) = send(&app, "GET", "/api/students?level=CP&status=all", None).await;
    assert_eq!(by_level.as_array().expect("list").len(), 1);
    assert_eq!(by_level[0]["firstName"], "Noah");
}

#[tokio::test]
async fn toggle_round_trips_paid_state() {
    let app = app();
    let (_, created) = send(&app, "POST", "/api/students", Some(lina_payload())).await;
    let id = created["id"].as_str().expect("id").to_string();

    let (status, rows) = send(&app, "GET", &format!("/api/payments/student/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let rows = rows.as_array().expect("rows");
    assert_eq!(rows[0]["period"], "2024-07", "most recent period first");
    let payment_id = rows[0]["id"].as_i64().expect("payment id");

    let (status, toggled) = send(
        &app,
        "PUT",
        &format!("/api/payments/{payment_id}/toggle"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(toggled["paid"], true);
    assert_eq!(toggled["paidDate"], "2024-05-15");

    let (_, back) = send(
        &app,
        "PUT",
        &format!("/api/payments/{payment_id}/toggle"),
        None,
    )
    .await;
    assert_eq!(back["paid"], false);
    assert!(back.get("paidDate").is_none());

    let (status, body) = send(&app, "PUT", "/api/payments/99999/toggle", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn overdue_lists_past_unpaid_rows() {
    let app = app();
    let (_, created) = send(&app, "POST", "/api/students", Some(lina_payload())).await;
    let id = created["id"].as_str().expect("id").to_string();

    let (status, rows) = send(&app, "GET", "/api/payments/overdue", None).await;
    assert_eq!(status, StatusCode::OK);
    let rows = rows.as_array().expect("rows");
    // 2024-03 and 2024-04 are past and unpaid, oldest first.
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["period"], "2024-03");
    assert_eq!(rows[1]["period"], "2024-04");
    assert_eq!(rows[0]["studentId"].as_str().unwrap(), id);
    assert_eq!(rows[0]["amount"], 50.0);
}

#[tokio::test]
async fn dashboard_tracks_revenue_and_rate() {
    let app = app();
    let (_, created) = send(&app, "POST", "/api/students", Some(lina_payload())).await;
    let id = created["id"].as_str().expect("id").to_string();

    let (status, stats) = send(&app, "GET", "/api/stats/dashboard", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalStudents"], 1);
    assert_eq!(stats["activeStudents"], 1);
    assert_eq!(stats["currentPeriod"], "2024-05");
    assert_eq!(stats["studentsOwedThisPeriod"], 1);
    assert_eq!(stats["unpaidThisPeriod"], 1);
    assert_eq!(stats["totalRevenue"], 0.0);
    assert_eq!(stats["paymentRate"], 0);
    assert_eq!(stats["paymentsOverdue"], 2);

    // Pay the current month.
    let (_, rows) = send(&app, "GET", &format!("/api/payments/student/{id}"), None).await;
    let current = rows
        .as_array()
        .expect("rows")
        .iter()
        .find(|row| row["period"] == "2024-05")
        .expect("current row");
    let payment_id = current["id"].as_i64().expect("payment id");
    send(&app, "PUT", &format!("/api/payments/{payment_id}/toggle"), None).await;

    let (_, stats) = send(&app, "GET", "/api/stats/dashboard", None).await;
    assert_eq!(stats["paidThisPeriod"], 1);
    assert_eq!(stats["unpaidThisPeriod"], 0);
    assert_eq!(stats["totalRevenue"], 50.0);
    assert_eq!(stats["paymentRate"], 100);

    let levels = stats["levelDistribution"].as_array().expect("levels");
    assert_eq!(levels.len(), 16);
    let cm2 = levels
        .iter()
        .find(|entry| entry["level"] == "CM2")
        .expect("CM2 bucket");
    assert_eq!(cm2["count"], 1);
}
