//! tutora-storage-json
//!
//! Filesystem-backed JSON persistence for the school roster and payment
//! ledger, the local-store variant's repository. Two documents live under a
//! data directory: `students.json` and `payments.json`, each wrapped in an
//! envelope carrying its last-updated stamp and document version.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tutora_core::{ensure_supported_snapshot, CoreError, SchoolStore};
use tutora_domain::{PaymentLedger, Snapshot, Student, SNAPSHOT_VERSION};

const STUDENTS_FILE: &str = "students.json";
const PAYMENTS_FILE: &str = "payments.json";
const TMP_SUFFIX: &str = "tmp";

/// Envelope around the roster document.
#[derive(Debug, Serialize, Deserialize)]
struct StudentsDoc {
    students: Vec<Student>,
    last_updated: DateTime<Utc>,
    version: String,
}

/// Envelope around the ledger document.
#[derive(Debug, Serialize, Deserialize)]
struct PaymentsDoc {
    payments: PaymentLedger,
    last_updated: DateTime<Utc>,
    version: String,
}

/// JSON-document store. Writes stage to a `.tmp` sibling and commit with a
/// rename, so a crash mid-write never corrupts the previous document.
#[derive(Debug, Clone)]
pub struct JsonSchoolStore {
    data_dir: PathBuf,
}

impl JsonSchoolStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    /// Store rooted at the platform data directory.
    pub fn at_default_location() -> Result<Self, CoreError> {
        let base = dirs::data_dir()
            .ok_or_else(|| CoreError::Storage("no platform data directory".into()))?;
        Self::new(base.join("tutora"))
    }

    pub fn students_path(&self) -> PathBuf {
        self.data_dir.join(STUDENTS_FILE)
    }

    pub fn payments_path(&self) -> PathBuf {
        self.data_dir.join(PAYMENTS_FILE)
    }

    /// Parses raw exported JSON into a snapshot. Malformed text fails here,
    /// before any state could be touched.
    pub fn parse_snapshot(raw: &str) -> Result<Snapshot, CoreError> {
        serde_json::from_str(raw).map_err(|err| CoreError::ImportFormat(err.to_string()))
    }

    /// Removes both documents; the next load starts empty.
    pub fn clear(&self) -> Result<(), CoreError> {
        for path in [self.students_path(), self.payments_path()] {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn read_doc<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, CoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| CoreError::Serde(format!("{}: {err}", path.display())))
    }

    fn write_doc<T: Serialize>(&self, path: &Path, doc: &T) -> Result<(), CoreError> {
        let json =
            serde_json::to_string_pretty(doc).map_err(|err| CoreError::Serde(err.to_string()))?;
        write_atomic(path, &json)
    }
}

impl SchoolStore for JsonSchoolStore {
    fn load_students(&self) -> Result<Vec<Student>, CoreError> {
        Ok(self
            .read_doc::<StudentsDoc>(&self.students_path())?
            .map(|doc| doc.students)
            .unwrap_or_default())
    }

    fn save_students(&self, students: &[Student]) -> Result<(), CoreError> {
        let doc = StudentsDoc {
            students: students.to_vec(),
            last_updated: Utc::now(),
            version: SNAPSHOT_VERSION.to_string(),
        };
        self.write_doc(&self.students_path(), &doc)
    }

    fn load_payments(&self) -> Result<PaymentLedger, CoreError> {
        Ok(self
            .read_doc::<PaymentsDoc>(&self.payments_path())?
            .map(|doc| doc.payments)
            .unwrap_or_default())
    }

    fn save_payments(&self, payments: &PaymentLedger) -> Result<(), CoreError> {
        let doc = PaymentsDoc {
            payments: payments.clone(),
            last_updated: Utc::now(),
            version: SNAPSHOT_VERSION.to_string(),
        };
        self.write_doc(&self.payments_path(), &doc)
    }

    fn export_snapshot(&self) -> Result<Snapshot, CoreError> {
        Ok(Snapshot {
            students: self.load_students()?,
            payments: self.load_payments()?,
            exported_at: Utc::now(),
            version: SNAPSHOT_VERSION.to_string(),
        })
    }

    fn import_snapshot(&self, snapshot: &Snapshot) -> Result<(), CoreError> {
        ensure_supported_snapshot(snapshot)?;
        // Serialize both documents before renaming either, so a failure in
        // either serialization leaves the previous state fully intact.
        let students_doc = StudentsDoc {
            students: snapshot.students.clone(),
            last_updated: Utc::now(),
            version: SNAPSHOT_VERSION.to_string(),
        };
        let payments_doc = PaymentsDoc {
            payments: snapshot.payments.clone(),
            last_updated: Utc::now(),
            version: SNAPSHOT_VERSION.to_string(),
        };
        let students_json = serde_json::to_string_pretty(&students_doc)
            .map_err(|err| CoreError::Serde(err.to_string()))?;
        let payments_json = serde_json::to_string_pretty(&payments_doc)
            .map_err(|err| CoreError::Serde(err.to_string()))?;

        write_atomic(&self.students_path(), &students_json)?;
        write_atomic(&self.payments_path(), &payments_json)?;
        tracing::info!(
            students = snapshot.students.len(),
            payments = snapshot.payments.len(),
            "snapshot imported"
        );
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{existing}.{TMP_SUFFIX}"),
        None => TMP_SUFFIX.to_string(),
    };
    tmp.set_extension(ext);
    tmp
}

fn write_atomic(path: &Path, data: &str) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
