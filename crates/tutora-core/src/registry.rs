//! Validated student mutations against the school aggregate.

use chrono::NaiveDate;
use tutora_domain::{Level, Month, School, Student, StudentStatus};
use uuid::Uuid;

use crate::error::CoreError;

/// Raw attributes as a form or API request carries them; `level` and
/// `subscription_month` arrive unparsed.
#[derive(Debug, Clone, Default)]
pub struct StudentDraft {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<String>,
    pub level: String,
    pub subscription_month: String,
    pub monthly_price: Option<f64>,
    pub notes: Option<String>,
    pub status: Option<StudentStatus>,
}

/// Optional listing filters; all criteria must match.
#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    /// Case-insensitive substring over first name, last name, and email.
    pub search: Option<String>,
    pub level: Option<Level>,
    pub status: Option<StudentStatus>,
}

impl StudentFilter {
    pub fn matches(&self, student: &Student) -> bool {
        if let Some(level) = self.level {
            if student.level != level {
                return false;
            }
        }
        if let Some(status) = self.status {
            if student.status != status {
                return false;
            }
        }
        if let Some(search) = self.search.as_deref() {
            let needle = search.to_lowercase();
            let haystacks = [
                Some(student.first_name.as_str()),
                Some(student.last_name.as_str()),
                student.email.as_deref(),
            ];
            if !haystacks
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&needle))
            {
                return false;
            }
        }
        true
    }
}

struct ValidatedDraft {
    level: Level,
    subscription_start: Month,
    monthly_price: f64,
}

/// Provides validated mutations for [`Student`] records.
pub struct StudentService;

impl StudentService {
    /// Validates and appends a new student; assigns the id and stamps the
    /// registration date. Returns the created record.
    pub fn create(
        school: &mut School,
        draft: StudentDraft,
        today: NaiveDate,
    ) -> Result<Student, CoreError> {
        let student = Self::build(&draft, today)?;
        school.add_student(student.clone());
        Ok(student)
    }

    /// Applies the draft to an existing student, preserving id and
    /// registration date.
    pub fn update(
        school: &mut School,
        id: Uuid,
        draft: StudentDraft,
    ) -> Result<Student, CoreError> {
        let existing = school
            .student(id)
            .ok_or(CoreError::StudentNotFound(id))?
            .clone();
        let updated = Self::apply_draft(&existing, &draft)?;
        let slot = school
            .student_mut(id)
            .ok_or(CoreError::StudentNotFound(id))?;
        *slot = updated.clone();
        school.touch();
        Ok(updated)
    }

    /// Removes the student; the aggregate drops their ledger entries in the
    /// same step, so the cascade is not observable partway.
    pub fn delete(school: &mut School, id: Uuid) -> Result<Student, CoreError> {
        school
            .remove_student(id)
            .ok_or(CoreError::StudentNotFound(id))
    }

    /// Lazy, restartable listing in insertion order.
    pub fn list<'a>(
        school: &'a School,
        filter: &'a StudentFilter,
    ) -> impl Iterator<Item = &'a Student> + 'a {
        school
            .students
            .iter()
            .filter(move |student| filter.matches(student))
    }

    /// Validates a draft into a brand-new record. Shared by the in-memory
    /// path and storage backends that construct rows themselves.
    pub fn build(draft: &StudentDraft, today: NaiveDate) -> Result<Student, CoreError> {
        let parsed = Self::validate(draft)?;
        let mut student = Student::new(
            draft.first_name.trim(),
            draft.last_name.trim(),
            parsed.level,
            parsed.subscription_start,
            today,
        );
        Self::copy_optional_fields(&mut student, draft, parsed.monthly_price);
        Ok(student)
    }

    /// Validates a draft into an updated copy of `existing`, keeping its
    /// id and registration date.
    pub fn apply_draft(existing: &Student, draft: &StudentDraft) -> Result<Student, CoreError> {
        let parsed = Self::validate(draft)?;
        let mut student = existing.clone();
        student.first_name = draft.first_name.trim().to_string();
        student.last_name = draft.last_name.trim().to_string();
        student.level = parsed.level;
        student.subscription_start = parsed.subscription_start;
        Self::copy_optional_fields(&mut student, draft, parsed.monthly_price);
        Ok(student)
    }

    fn copy_optional_fields(student: &mut Student, draft: &StudentDraft, price: f64) {
        student.email = normalize(&draft.email);
        student.phone = normalize(&draft.phone);
        student.birth_date = normalize(&draft.birth_date);
        student.notes = normalize(&draft.notes);
        student.monthly_price = price;
        student.status = draft.status.unwrap_or_default();
    }

    /// Collects every offending field instead of stopping at the first.
    fn validate(draft: &StudentDraft) -> Result<ValidatedDraft, CoreError> {
        let mut invalid = Vec::new();

        if draft.first_name.trim().is_empty() {
            invalid.push("first_name".to_string());
        }
        if draft.last_name.trim().is_empty() {
            invalid.push("last_name".to_string());
        }

        let level = if draft.level.trim().is_empty() {
            invalid.push("level".to_string());
            None
        } else {
            match draft.level.parse::<Level>() {
                Ok(level) => Some(level),
                Err(_) => {
                    invalid.push("level".to_string());
                    None
                }
            }
        };

        let subscription_start = if draft.subscription_month.trim().is_empty() {
            invalid.push("subscription_month".to_string());
            None
        } else {
            match draft.subscription_month.parse::<Month>() {
                Ok(month) => Some(month),
                Err(_) => {
                    invalid.push("subscription_month".to_string());
                    None
                }
            }
        };

        let monthly_price = draft.monthly_price.unwrap_or(0.0);
        if monthly_price < 0.0 {
            invalid.push("monthly_price".to_string());
        }

        if !invalid.is_empty() {
            return Err(CoreError::Validation(invalid));
        }
        Ok(ValidatedDraft {
            level: level.expect("validated"),
            subscription_start: subscription_start.expect("validated"),
            monthly_price,
        })
    }
}

fn normalize(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
