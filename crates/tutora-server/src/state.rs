use std::sync::Arc;

use tutora_core::Clock;
use tutora_storage_sqlite::SqliteSchoolStore;

/// Shared application state handed to every handler. The store serializes
/// mutations internally; the clock is swappable so tests pin the date.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteSchoolStore>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(store: Arc<SqliteSchoolStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}
