//! The school aggregate: roster plus payment ledger, and its snapshot form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ledger::PaymentLedger, student::Student};

/// Snapshot document version written by exports and required by imports.
pub const SNAPSHOT_VERSION: &str = "1.0";

/// The full in-memory state: every student and every ledger entry.
///
/// This is the single state container mutators and the statistics engine
/// operate on; storage backends load and persist it as a whole. `students`
/// keeps insertion order, which is the local-store variant's listing order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct School {
    pub students: Vec<Student>,
    pub payments: PaymentLedger,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl School {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            students: Vec::new(),
            payments: PaymentLedger::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_parts(students: Vec<Student>, payments: PaymentLedger) -> Self {
        let now = Utc::now();
        Self {
            students,
            payments,
            created_at: now,
            updated_at: now,
        }
    }

    /// Bumps the modification stamp; every mutator calls this.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn student(&self, id: Uuid) -> Option<&Student> {
        self.students.iter().find(|student| student.id == id)
    }

    pub fn student_mut(&mut self, id: Uuid) -> Option<&mut Student> {
        self.students.iter_mut().find(|student| student.id == id)
    }

    pub fn add_student(&mut self, student: Student) {
        self.students.push(student);
        self.touch();
    }

    /// Removes the student and every ledger entry keyed by them in one
    /// operation, so no caller can observe a half-deleted state.
    pub fn remove_student(&mut self, id: Uuid) -> Option<Student> {
        let index = self.students.iter().position(|student| student.id == id)?;
        let removed = self.students.remove(index);
        self.payments.remove_student(id);
        self.touch();
        Some(removed)
    }
}

/// Serialized export document: the whole state plus provenance metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub students: Vec<Student>,
    pub payments: PaymentLedger,
    #[serde(rename = "exportedAt")]
    pub exported_at: DateTime<Utc>,
    pub version: String,
}

impl Snapshot {
    pub fn capture(school: &School, exported_at: DateTime<Utc>) -> Self {
        Self {
            students: school.students.clone(),
            payments: school.payments.clone(),
            exported_at,
            version: SNAPSHOT_VERSION.to_string(),
        }
    }

    /// Imports must reject unknown versions before touching any state.
    pub fn is_supported(&self) -> bool {
        self.version == SNAPSHOT_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{month::Month, student::Level};
    use chrono::NaiveDate;

    fn sample_student(first: &str, last: &str) -> Student {
        Student::new(
            first,
            last,
            Level::Cm2,
            "2024-01".parse::<Month>().unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
        )
    }

    #[test]
    fn remove_student_cascades_ledger_entries() {
        let mut school = School::new(Utc::now());
        let student = sample_student("Lina", "Moreau");
        let id = student.id;
        school.add_student(student);
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        school
            .payments
            .toggle(id, "2024-01".parse().unwrap(), today);
        school
            .payments
            .toggle(id, "2024-02".parse().unwrap(), today);

        let removed = school.remove_student(id).expect("student existed");
        assert_eq!(removed.id, id);
        assert!(school.payments.is_empty());
        assert!(school.student(id).is_none());
    }

    #[test]
    fn remove_unknown_student_is_none() {
        let mut school = School::new(Utc::now());
        assert!(school.remove_student(Uuid::new_v4()).is_none());
    }

    #[test]
    fn snapshot_captures_state_and_version() {
        let mut school = School::new(Utc::now());
        school.add_student(sample_student("Noah", "Petit"));
        let snapshot = Snapshot::capture(&school, Utc::now());
        assert_eq!(snapshot.students, school.students);
        assert!(snapshot.is_supported());

        let mut stale = snapshot.clone();
        stale.version = "0.9".into();
        assert!(!stale.is_supported());
    }
}
