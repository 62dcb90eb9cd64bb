//! Derived dashboard aggregates, recomputed from current state on demand.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tutora_domain::{Level, Month, PeriodStatus, School};
use uuid::Uuid;

use crate::calendar::{PeriodCalendar, LOOKAHEAD_MONTHS};

/// Student count for one grade level; zero-count levels are included.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LevelCount {
    pub level: Level,
    pub count: usize,
}

/// The dashboard aggregate object. Every field is a projection over the
/// current roster and ledger; nothing here is persisted or cached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub total_students: usize,
    pub active_students: usize,
    pub current_period: Month,
    pub students_owed_this_period: usize,
    pub paid_this_period: usize,
    pub unpaid_this_period: usize,
    /// Sum of monthly prices over students paid for the current period;
    /// owed-but-unpaid students contribute zero.
    pub total_revenue: f64,
    /// Rounded percentage, 0 when nobody owes this period.
    pub payment_rate: u32,
    /// Historical scan over every student's every owed period, not a
    /// current-month count.
    pub payments_overdue: usize,
    pub level_distribution: Vec<LevelCount>,
}

/// One row of the overdue listing: an unpaid past period and who owes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OverdueEntry {
    pub student_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub period: Month,
    pub amount: f64,
    pub days_overdue: i64,
}

/// Computes dashboard aggregates by composing the calendar, ledger, and
/// roster. Cannot fail: divisions are guarded and lookups default.
pub struct StatsService;

impl StatsService {
    pub fn dashboard(school: &School, today: NaiveDate) -> Dashboard {
        let current_period = Month::from_date(today);

        let total_students = school.students.len();
        let active_students = school
            .students
            .iter()
            .filter(|student| student.is_active())
            .count();

        let owed_now: Vec<_> = school
            .students
            .iter()
            .filter(|student| {
                PeriodCalendar::owed_periods(
                    student.subscription_start,
                    today,
                    LOOKAHEAD_MONTHS,
                )
                .contains(&current_period)
            })
            .collect();

        let paid_this_period = owed_now
            .iter()
            .filter(|student| school.payments.is_paid(student.id, current_period))
            .count();
        let unpaid_this_period = owed_now.len() - paid_this_period;

        let total_revenue: f64 = owed_now
            .iter()
            .filter(|student| school.payments.is_paid(student.id, current_period))
            .map(|student| student.monthly_price)
            .sum();

        let payment_rate = if owed_now.is_empty() {
            0
        } else {
            (paid_this_period as f64 / owed_now.len() as f64 * 100.0).round() as u32
        };

        // Full historical scan across all students and all owed periods.
        let payments_overdue = school
            .students
            .iter()
            .map(|student| {
                PeriodCalendar::owed_periods(student.subscription_start, today, LOOKAHEAD_MONTHS)
                    .into_iter()
                    .filter(|period| {
                        PeriodCalendar::classify(*period, today) == PeriodStatus::Past
                            && !school.payments.is_paid(student.id, *period)
                    })
                    .count()
            })
            .sum();

        let level_distribution = Level::ALL
            .iter()
            .map(|level| LevelCount {
                level: *level,
                count: school
                    .students
                    .iter()
                    .filter(|student| student.level == *level)
                    .count(),
            })
            .collect();

        Dashboard {
            total_students,
            active_students,
            current_period,
            students_owed_this_period: owed_now.len(),
            paid_this_period,
            unpaid_this_period,
            total_revenue,
            payment_rate,
            payments_overdue,
            level_distribution,
        }
    }

    /// Detail rows behind the overdue report: active students only, oldest
    /// period first.
    pub fn overdue_entries(school: &School, today: NaiveDate) -> Vec<OverdueEntry> {
        let mut rows = Vec::new();
        for student in school.students.iter().filter(|s| s.is_active()) {
            for period in
                PeriodCalendar::owed_periods(student.subscription_start, today, LOOKAHEAD_MONTHS)
            {
                if PeriodCalendar::classify(period, today) == PeriodStatus::Past
                    && !school.payments.is_paid(student.id, period)
                {
                    rows.push(OverdueEntry {
                        student_id: student.id,
                        first_name: student.first_name.clone(),
                        last_name: student.last_name.clone(),
                        email: student.email.clone(),
                        phone: student.phone.clone(),
                        period,
                        amount: student.monthly_price,
                        days_overdue: (today - period.first_day()).num_days(),
                    });
                }
            }
        }
        rows.sort_by(|a, b| a.period.cmp(&b.period));
        rows
    }
}
