//! Student CRUD endpoints.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tutora_core::{CoreError, StudentDraft, StudentFilter, StudentService};
use tutora_domain::{Level, Month, Student, StudentStatus};
use tutora_storage_sqlite::StudentWithPayments;
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// Incoming student attributes, as the form posts them. Everything is
/// defaulted so missing required fields reach the validator and come back
/// as a field list instead of a deserialization error.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StudentPayload {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<String>,
    pub level: String,
    pub subscription_month: String,
    pub price: Option<f64>,
    pub notes: Option<String>,
    pub status: Option<StudentStatus>,
}

impl From<StudentPayload> for StudentDraft {
    fn from(payload: StudentPayload) -> Self {
        StudentDraft {
            first_name: payload.first_name,
            last_name: payload.last_name,
            email: payload.email,
            phone: payload.phone,
            birth_date: payload.birth_date,
            level: payload.level,
            subscription_month: payload.subscription_month,
            monthly_price: payload.price,
            notes: payload.notes,
            status: payload.status,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentResponse {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    pub level: Level,
    pub subscription_month: Month,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: StudentStatus,
    pub registration_date: NaiveDate,
    /// Per-period paid map, keyed `"YYYY-MM"`.
    pub payments: BTreeMap<Month, bool>,
}

impl StudentResponse {
    fn new(student: Student, payments: BTreeMap<Month, bool>) -> Self {
        Self {
            id: student.id,
            first_name: student.first_name,
            last_name: student.last_name,
            email: student.email,
            phone: student.phone,
            birth_date: student.birth_date,
            level: student.level,
            subscription_month: student.subscription_start,
            price: student.monthly_price,
            notes: student.notes,
            status: student.status,
            registration_date: student.registration_date,
            payments,
        }
    }
}

impl From<StudentWithPayments> for StudentResponse {
    fn from(entry: StudentWithPayments) -> Self {
        Self::new(entry.student, entry.payments)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub level: Option<String>,
    pub status: Option<String>,
}

/// GET /api/students?search=&level=&status=
///
/// Status defaults to `active`; `status=all` lifts the filter.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<StudentResponse>>, ApiError> {
    let status = match query.status.as_deref() {
        None => Some(StudentStatus::Active),
        Some("all") => None,
        Some("inactive") => Some(StudentStatus::Inactive),
        Some(_) => Some(StudentStatus::Active),
    };
    let level = query
        .level
        .as_deref()
        .filter(|raw| !raw.is_empty())
        .map(|raw| {
            raw.parse::<Level>()
                .map_err(|_| CoreError::Validation(vec!["level".to_string()]))
        })
        .transpose()?;
    let filter = StudentFilter {
        search: query.search.filter(|raw| !raw.is_empty()),
        level,
        status,
    };

    let rows = state.store.list_students(&filter)?;
    Ok(Json(rows.into_iter().map(StudentResponse::from).collect()))
}

/// POST /api/students
pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<StudentPayload>,
) -> Result<(StatusCode, Json<StudentResponse>), ApiError> {
    let today = state.clock.today();
    let student = StudentService::build(&StudentDraft::from(payload), today)?;
    state.store.insert_student(&student, today)?;
    tracing::info!(student = %student.id, "student created");
    let payments = payment_map(&state, student.id)?;
    Ok((StatusCode::CREATED, Json(StudentResponse::new(student, payments))))
}

/// PUT /api/students/:id
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StudentPayload>,
) -> Result<Json<StudentResponse>, ApiError> {
    let existing = state.store.get_student(id)?;
    let updated = StudentService::apply_draft(&existing, &StudentDraft::from(payload))?;
    state.store.update_student(&updated, state.clock.today())?;
    tracing::info!(student = %id, "student updated");
    let payments = payment_map(&state, id)?;
    Ok(Json(StudentResponse::new(updated, payments)))
}

/// DELETE /api/students/:id
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_student(id)?;
    tracing::info!(student = %id, "student deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn payment_map(state: &AppState, student: Uuid) -> Result<BTreeMap<Month, bool>, ApiError> {
    let rows = state.store.payments_for_student(student)?;
    Ok(rows
        .into_iter()
        .map(|row| (row.period, row.paid))
        .collect())
}
