//! The repository contract both storage backends implement.

use tutora_domain::{PaymentLedger, School, Snapshot, Student};

use crate::error::CoreError;

/// Abstraction over persistence backends capable of storing the roster and
/// ledger. Both the JSON-document store and the SQLite store present this
/// same shape, so the services and statistics engine never know which one
/// is behind them.
pub trait SchoolStore: Send + Sync {
    fn load_students(&self) -> Result<Vec<Student>, CoreError>;
    fn save_students(&self, students: &[Student]) -> Result<(), CoreError>;
    fn load_payments(&self) -> Result<PaymentLedger, CoreError>;
    fn save_payments(&self, payments: &PaymentLedger) -> Result<(), CoreError>;

    /// Serializes the full state into an export document.
    fn export_snapshot(&self) -> Result<Snapshot, CoreError>;

    /// Replaces the full state with the snapshot's. Malformed or
    /// unsupported input must fail without mutating existing state.
    fn import_snapshot(&self, snapshot: &Snapshot) -> Result<(), CoreError>;

    /// Loads the whole aggregate; default composes the two primitives.
    fn load_school(&self) -> Result<School, CoreError> {
        Ok(School::from_parts(
            self.load_students()?,
            self.load_payments()?,
        ))
    }

    /// Persists the whole aggregate; default composes the two primitives.
    fn save_school(&self, school: &School) -> Result<(), CoreError> {
        self.save_students(&school.students)?;
        self.save_payments(&school.payments)
    }
}

/// Guard shared by store implementations: rejects snapshots whose version
/// this build does not understand.
pub fn ensure_supported_snapshot(snapshot: &Snapshot) -> Result<(), CoreError> {
    if snapshot.is_supported() {
        Ok(())
    } else {
        Err(CoreError::ImportFormat(format!(
            "unsupported snapshot version `{}`",
            snapshot.version
        )))
    }
}
