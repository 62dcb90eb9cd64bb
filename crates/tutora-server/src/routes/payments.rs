//! Payment ledger endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::NaiveDate;
use serde::Serialize;
use tutora_domain::Month;
use tutora_storage_sqlite::{OverdueRow, PaymentRow};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub id: i64,
    pub student_id: Uuid,
    pub period: Month,
    pub amount: f64,
    pub paid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_date: Option<NaiveDate>,
}

impl From<PaymentRow> for PaymentResponse {
    fn from(row: PaymentRow) -> Self {
        Self {
            id: row.id,
            student_id: row.student_id,
            period: row.period,
            amount: row.amount,
            paid: row.paid,
            paid_date: row.paid_date,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverdueResponse {
    pub student_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub period: Month,
    pub amount: f64,
    pub days_overdue: i64,
}

impl From<OverdueRow> for OverdueResponse {
    fn from(row: OverdueRow) -> Self {
        Self {
            student_id: row.payment.student_id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            period: row.payment.period,
            amount: row.payment.amount,
            days_overdue: row.days_overdue,
        }
    }
}

/// GET /api/payments/student/:id, rows ordered most recent period first.
pub async fn for_student(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<PaymentResponse>>, ApiError> {
    let rows = state.store.payments_for_student(id)?;
    Ok(Json(rows.into_iter().map(PaymentResponse::from).collect()))
}

/// PUT /api/payments/:id/toggle
pub async fn toggle(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let row = state.store.toggle_payment(id, state.clock.today())?;
    tracing::info!(payment = id, paid = row.paid, "payment toggled");
    Ok(Json(PaymentResponse::from(row)))
}

/// GET /api/payments/overdue, listing active students only, oldest period first.
pub async fn overdue(
    State(state): State<AppState>,
) -> Result<Json<Vec<OverdueResponse>>, ApiError> {
    let rows = state.store.overdue_payments(state.clock.today())?;
    Ok(Json(rows.into_iter().map(OverdueResponse::from).collect()))
}
