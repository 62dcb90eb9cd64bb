//! Payment ledger mutations routed through the school aggregate.

use chrono::NaiveDate;
use tutora_domain::{Month, PaymentEntry, School};
use uuid::Uuid;

use crate::error::CoreError;

/// Provides ledger lookups and mutations for the in-memory variant.
pub struct PaymentService;

impl PaymentService {
    /// Absent entries read as unpaid; "no entry" is never "paid".
    pub fn is_paid(school: &School, student: Uuid, period: Month) -> bool {
        school.payments.is_paid(student, period)
    }

    /// Flips the paid state for `(student, period)`, creating the entry
    /// when missing, and marks the aggregate dirty for persistence.
    /// Unknown students are rejected so the ledger cannot accumulate
    /// entries for rows the registry never held.
    pub fn toggle(
        school: &mut School,
        student: Uuid,
        period: Month,
        today: NaiveDate,
    ) -> Result<PaymentEntry, CoreError> {
        if school.student(student).is_none() {
            return Err(CoreError::StudentNotFound(student));
        }
        let entry = school.payments.toggle(student, period, today);
        school.touch();
        Ok(entry)
    }

    /// Entries for one student, most recent period first.
    pub fn for_student(school: &School, student: Uuid) -> Vec<(Month, PaymentEntry)> {
        school.payments.for_student(student)
    }

    /// Drops every ledger entry belonging to `student`. Student deletion
    /// goes through [`School::remove_student`], which performs this as part
    /// of the same step; this standalone form exists for store maintenance.
    pub fn remove_all_for_student(school: &mut School, student: Uuid) -> usize {
        let removed = school.payments.remove_student(student);
        if removed > 0 {
            school.touch();
        }
        removed
    }
}
