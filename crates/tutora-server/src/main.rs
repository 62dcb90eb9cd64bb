use std::sync::{Arc, Once};

use tutora_core::SystemClock;
use tutora_server::{router, AppState};
use tutora_storage_sqlite::SqliteSchoolStore;

static TRACING_INIT: Once = Once::new();

/// Initializes the global tracing subscriber with sensible defaults.
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::from_default_env()
            .add_directive("tutora_server=info".parse().expect("valid directive"))
            .add_directive("tower_http=info".parse().expect("valid directive"));

        fmt().with_env_filter(filter).init();
    });
}

#[tokio::main]
async fn main() {
    init_tracing();

    let db_path = std::env::var("TUTORA_DB").unwrap_or_else(|_| "school.db".to_string());
    let addr = std::env::var("TUTORA_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string());

    let store = SqliteSchoolStore::open(&db_path).expect("failed to open database");
    tracing::info!(path = %db_path, "database opened");

    let state = AppState::new(Arc::new(store), Arc::new(SystemClock));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    tracing::info!(%addr, "server listening");

    axum::serve(listener, app)
        .await
        .expect("server terminated unexpectedly");
}
