//! The sparse paid/unpaid record keyed by (student, billing period).

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::month::Month;

/// Paid state for one (student, period) key. Absence of an entry in the
/// ledger always reads as unpaid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentEntry {
    pub paid: bool,
    /// Set on the unpaid→paid transition, cleared on the way back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_date: Option<NaiveDate>,
}

/// Sparse mapping from (student id, period) to payment state.
///
/// Entries are created lazily on the first toggle and never have an
/// existence independent of their student: deleting a student drops every
/// entry keyed by them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentLedger {
    entries: BTreeMap<(Uuid, Month), PaymentEntry>,
}

impl PaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the period is paid; missing keys are unpaid, never paid.
    pub fn is_paid(&self, student: Uuid, period: Month) -> bool {
        self.entries
            .get(&(student, period))
            .map(|entry| entry.paid)
            .unwrap_or(false)
    }

    pub fn entry(&self, student: Uuid, period: Month) -> Option<&PaymentEntry> {
        self.entries.get(&(student, period))
    }

    /// Flips the paid state, creating the entry when missing. Returns the
    /// entry after the flip.
    pub fn toggle(&mut self, student: Uuid, period: Month, today: NaiveDate) -> PaymentEntry {
        let entry = self.entries.entry((student, period)).or_default();
        entry.paid = !entry.paid;
        entry.paid_date = entry.paid.then_some(today);
        *entry
    }

    /// Records an explicit paid state, used when ingesting external rows.
    pub fn set(&mut self, student: Uuid, period: Month, entry: PaymentEntry) {
        self.entries.insert((student, period), entry);
    }

    /// Drops every entry belonging to `student`, returning how many were
    /// removed.
    pub fn remove_student(&mut self, student: Uuid) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(owner, _), _| *owner != student);
        before - self.entries.len()
    }

    /// Entries for one student, most recent period first.
    pub fn for_student(&self, student: Uuid) -> Vec<(Month, PaymentEntry)> {
        let mut rows: Vec<_> = self
            .entries
            .iter()
            .filter(|((owner, _), _)| *owner == student)
            .map(|((_, period), entry)| (*period, *entry))
            .collect();
        rows.sort_by(|a, b| b.0.cmp(&a.0));
        rows
    }

    pub fn iter(&self) -> impl Iterator<Item = (Uuid, Month, &PaymentEntry)> {
        self.entries
            .iter()
            .map(|((student, period), entry)| (*student, *period, entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn composite_key(student: Uuid, period: Month) -> String {
    format!("{student}_{period}")
}

fn parse_composite_key(raw: &str) -> Option<(Uuid, Month)> {
    let (student, period) = raw.rsplit_once('_')?;
    Some((student.parse().ok()?, period.parse().ok()?))
}

/// Accepts both the full entry object and the bare boolean the historical
/// local-store documents used for each key.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredPayment {
    Flag(bool),
    Entry(PaymentEntry),
}

impl Serialize for PaymentLedger {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let map: BTreeMap<String, &PaymentEntry> = self
            .entries
            .iter()
            .map(|((student, period), entry)| (composite_key(*student, *period), entry))
            .collect();
        map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PaymentLedger {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, StoredPayment>::deserialize(deserializer)?;
        let mut ledger = PaymentLedger::new();
        for (key, value) in raw {
            let (student, period) = parse_composite_key(&key)
                .ok_or_else(|| de::Error::custom(format!("invalid payment key `{key}`")))?;
            let entry = match value {
                StoredPayment::Flag(paid) => PaymentEntry {
                    paid,
                    paid_date: None,
                },
                StoredPayment::Entry(entry) => entry,
            };
            ledger.set(student, period, entry);
        }
        Ok(ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(raw: &str) -> Month {
        raw.parse().unwrap()
    }

    #[test]
    fn missing_entries_read_as_unpaid() {
        let ledger = PaymentLedger::new();
        assert!(!ledger.is_paid(Uuid::new_v4(), month("2024-01")));
    }

    #[test]
    fn toggle_tracks_paid_date() {
        let mut ledger = PaymentLedger::new();
        let student = Uuid::new_v4();
        let today = NaiveDate::from_ymd_opt(2024, 5, 15).unwrap();

        let first = ledger.toggle(student, month("2024-05"), today);
        assert!(first.paid);
        assert_eq!(first.paid_date, Some(today));

        let second = ledger.toggle(student, month("2024-05"), today);
        assert!(!second.paid);
        assert_eq!(second.paid_date, None, "paid_date clears on untoggle");
    }

    #[test]
    fn remove_student_drops_only_their_entries() {
        let mut ledger = PaymentLedger::new();
        let kept = Uuid::new_v4();
        let removed = Uuid::new_v4();
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        ledger.toggle(kept, month("2024-04"), today);
        ledger.toggle(removed, month("2024-04"), today);
        ledger.toggle(removed, month("2024-05"), today);

        assert_eq!(ledger.remove_student(removed), 2);
        assert!(ledger.is_paid(kept, month("2024-04")));
        assert!(ledger.for_student(removed).is_empty());
    }

    #[test]
    fn for_student_orders_latest_period_first() {
        let mut ledger = PaymentLedger::new();
        let student = Uuid::new_v4();
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        ledger.toggle(student, month("2024-04"), today);
        ledger.toggle(student, month("2024-06"), today);
        ledger.toggle(student, month("2024-05"), today);

        let periods: Vec<String> = ledger
            .for_student(student)
            .into_iter()
            .map(|(period, _)| period.to_string())
            .collect();
        assert_eq!(periods, ["2024-06", "2024-05", "2024-04"]);
    }

    #[test]
    fn deserializes_legacy_boolean_documents() {
        let student = Uuid::new_v4();
        let json = format!("{{\"{student}_2024-03\": true, \"{student}_2024-04\": false}}");
        let ledger: PaymentLedger = serde_json::from_str(&json).expect("legacy doc parses");
        assert!(ledger.is_paid(student, month("2024-03")));
        assert!(!ledger.is_paid(student, month("2024-04")));
    }

    #[test]
    fn serde_round_trips_entries() {
        let mut ledger = PaymentLedger::new();
        let student = Uuid::new_v4();
        let today = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        ledger.toggle(student, month("2024-05"), today);

        let json = serde_json::to_string(&ledger).unwrap();
        let back: PaymentLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ledger);
    }
}
