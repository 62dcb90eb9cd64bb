//! Pure date logic turning an enrollment month into billable periods.

use chrono::NaiveDate;
use tutora_domain::{Month, PeriodStatus};

/// How many months past the current one a student is billed ahead.
pub const LOOKAHEAD_MONTHS: u32 = 2;

/// Months shown before/after the reference month on payment grids.
pub const DISPLAY_BEFORE: u32 = 3;
pub const DISPLAY_AFTER: u32 = 2;

/// Stateless period arithmetic; every function is pure.
pub struct PeriodCalendar;

impl PeriodCalendar {
    /// Ordered billing periods a student owes for: from their subscription
    /// start through the reference month plus `lookahead`, inclusive.
    /// Empty when the subscription starts beyond that horizon.
    pub fn owed_periods(start: Month, reference: NaiveDate, lookahead: u32) -> Vec<Month> {
        let end = Month::from_date(reference).add_months(lookahead as i32);
        let mut periods = Vec::new();
        let mut current = start;
        while current <= end {
            periods.push(current);
            current = current.next();
        }
        periods
    }

    /// Classifies `period` against the month containing `reference`.
    /// Day-of-month never participates.
    pub fn classify(period: Month, reference: NaiveDate) -> PeriodStatus {
        period.classify(reference)
    }

    /// `before + 1 + after` consecutive months centred on the reference
    /// month, the dashboard's payment-grid window.
    pub fn display_window(reference: NaiveDate, before: u32, after: u32) -> Vec<Month> {
        let center = Month::from_date(reference);
        (-(before as i32)..=after as i32)
            .map(|offset| center.add_months(offset))
            .collect()
    }
}
