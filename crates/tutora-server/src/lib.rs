//! tutora-server
//!
//! REST surface over the SQLite-backed store. Routing and handlers only;
//! every rule lives in tutora-core so the local-store variant computes the
//! same answers.

pub mod error;
pub mod routes;
pub mod state;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use error::ApiError;
pub use state::AppState;

/// Builds the full application router with the API nested under `/api`.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(routes::health))
        .route(
            "/students",
            get(routes::students::list).post(routes::students::create),
        )
        .route(
            "/students/:id",
            axum::routing::put(routes::students::update).delete(routes::students::delete),
        )
        .route(
            "/payments/student/:id",
            get(routes::payments::for_student),
        )
        .route(
            "/payments/:id/toggle",
            axum::routing::put(routes::payments::toggle),
        )
        .route("/payments/overdue", get(routes::payments::overdue))
        .route("/stats/dashboard", get(routes::stats::dashboard))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
