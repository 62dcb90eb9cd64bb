//! tutora-storage-sqlite
//!
//! Relational persistence for the school roster and payment ledger, the
//! backing store of the REST variant. Every mutation is one transaction;
//! payment rows are owned by their student row and cascade on delete.

use std::{
    collections::BTreeMap,
    path::Path,
    sync::{Mutex, MutexGuard},
};

use chrono::{NaiveDate, Utc};
use rusqlite::{params, params_from_iter, Connection, Row};
use tutora_core::{
    ensure_supported_snapshot, CoreError, PeriodCalendar, SchoolStore, StudentFilter,
    LOOKAHEAD_MONTHS,
};
use tutora_domain::{
    Level, Month, PaymentEntry, PaymentLedger, Snapshot, Student, StudentStatus, SNAPSHOT_VERSION,
};
use uuid::Uuid;

type Result<T> = std::result::Result<T, CoreError>;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS levels (
    code        TEXT PRIMARY KEY,
    order_index INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS students (
    id                 TEXT PRIMARY KEY,
    first_name         TEXT NOT NULL,
    last_name          TEXT NOT NULL,
    email              TEXT UNIQUE,
    phone              TEXT,
    birth_date         TEXT,
    level_code         TEXT NOT NULL REFERENCES levels(code),
    subscription_start TEXT NOT NULL,
    monthly_price      REAL NOT NULL DEFAULT 0,
    notes              TEXT,
    status             TEXT NOT NULL DEFAULT 'active',
    registration_date  TEXT NOT NULL,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS payments (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id TEXT NOT NULL REFERENCES students(id) ON DELETE CASCADE,
    period     TEXT NOT NULL,
    amount     REAL NOT NULL DEFAULT 0,
    paid       INTEGER NOT NULL DEFAULT 0,
    paid_date  TEXT,
    UNIQUE (student_id, period)
);

CREATE INDEX IF NOT EXISTS idx_payments_student ON payments(student_id);
CREATE INDEX IF NOT EXISTS idx_students_name ON students(last_name, first_name);
"#;

/// One payment row as the REST surface addresses it: by row id.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRow {
    pub id: i64,
    pub student_id: Uuid,
    pub period: Month,
    pub amount: f64,
    pub paid: bool,
    pub paid_date: Option<NaiveDate>,
}

/// A student paired with their `{period: paid}` map, the listing shape the
/// API embeds.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentWithPayments {
    pub student: Student,
    pub payments: BTreeMap<Month, bool>,
}

/// One row of the overdue report: the unpaid past-period row joined with
/// enough student detail to chase the payment.
#[derive(Debug, Clone, PartialEq)]
pub struct OverdueRow {
    pub payment: PaymentRow,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub days_overdue: i64,
}

/// SQLite-backed repository. The interior mutex serializes mutations, which
/// is the single-writer model the domain assumes.
pub struct SqliteSchoolStore {
    conn: Mutex<Connection>,
}

impl SqliteSchoolStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path).map_err(db_err)?)
    }

    /// Private on-disk-free store, used by tests and ad-hoc tooling.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory().map_err(db_err)?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON").map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        for (index, level) in Level::ALL.iter().enumerate() {
            conn.execute(
                "INSERT OR IGNORE INTO levels (code, order_index) VALUES (?1, ?2)",
                params![level.code(), index as i64],
            )
            .map_err(db_err)?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("connection mutex poisoned")
    }

    /// Inserts the student and pre-creates an unpaid payment row for every
    /// period owed through the lookahead window, in one transaction.
    pub fn insert_student(&self, student: &Student, today: NaiveDate) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO students (
                id, first_name, last_name, email, phone, birth_date,
                level_code, subscription_start, monthly_price, notes, status,
                registration_date, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                student.id.to_string(),
                student.first_name,
                student.last_name,
                student.email,
                student.phone,
                student.birth_date,
                student.level.code(),
                student.subscription_start.to_string(),
                student.monthly_price,
                student.notes,
                student.status.to_string(),
                student.registration_date.to_string(),
                now,
                now,
            ],
        )
        .map_err(db_err)?;
        seed_owed_rows(&tx, student, today)?;
        tx.commit().map_err(db_err)?;
        tracing::debug!(student = %student.id, "student inserted with seeded payment rows");
        Ok(())
    }

    /// Rewrites the student row, keeping id and registration date as the
    /// caller built them, and fills in any newly owed payment rows.
    pub fn update_student(&self, student: &Student, today: NaiveDate) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let changed = tx
            .execute(
                "UPDATE students SET
                    first_name = ?2, last_name = ?3, email = ?4, phone = ?5,
                    birth_date = ?6, level_code = ?7, subscription_start = ?8,
                    monthly_price = ?9, notes = ?10, status = ?11,
                    updated_at = ?12
                 WHERE id = ?1",
                params![
                    student.id.to_string(),
                    student.first_name,
                    student.last_name,
                    student.email,
                    student.phone,
                    student.birth_date,
                    student.level.code(),
                    student.subscription_start.to_string(),
                    student.monthly_price,
                    student.notes,
                    student.status.to_string(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(CoreError::StudentNotFound(student.id));
        }
        seed_owed_rows(&tx, student, today)?;
        tx.commit().map_err(db_err)?;
        Ok(())
    }

    /// Deletes the student row; the schema cascade drops their payment rows
    /// in the same transaction.
    pub fn delete_student(&self, id: Uuid) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let changed = tx
            .execute("DELETE FROM students WHERE id = ?1", params![id.to_string()])
            .map_err(db_err)?;
        if changed == 0 {
            return Err(CoreError::StudentNotFound(id));
        }
        tx.commit().map_err(db_err)?;
        Ok(())
    }

    pub fn get_student(&self, id: Uuid) -> Result<Student> {
        let conn = self.lock();
        conn.query_row(
            &format!("{STUDENT_SELECT} WHERE id = ?1"),
            params![id.to_string()],
            row_to_student,
        )
        .map_err(|err| match err {
            rusqlite::Error::QueryReturnedNoRows => CoreError::StudentNotFound(id),
            other => db_err(other),
        })
    }

    /// Lists students ordered by last name then first name, each with their
    /// `{period: paid}` map. Search is a case-insensitive substring over
    /// first/last name and email; level and status are exact.
    pub fn list_students(&self, filter: &StudentFilter) -> Result<Vec<StudentWithPayments>> {
        let conn = self.lock();
        let mut sql = format!("{STUDENT_SELECT} WHERE 1=1");
        let mut args: Vec<String> = Vec::new();

        if let Some(status) = filter.status {
            args.push(status.to_string());
            sql.push_str(&format!(" AND status = ?{}", args.len()));
        }
        if let Some(level) = filter.level {
            args.push(level.code().to_string());
            sql.push_str(&format!(" AND level_code = ?{}", args.len()));
        }
        if let Some(search) = filter.search.as_deref() {
            let pattern = format!("%{}%", search.to_lowercase());
            args.push(pattern);
            let slot = args.len();
            sql.push_str(&format!(
                " AND (lower(first_name) LIKE ?{slot} OR lower(last_name) LIKE ?{slot} \
                 OR lower(coalesce(email, '')) LIKE ?{slot})"
            ));
        }
        sql.push_str(" ORDER BY last_name, first_name");

        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let students = stmt
            .query_map(params_from_iter(args), row_to_student)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;

        let mut result = Vec::with_capacity(students.len());
        let mut payments_stmt = conn
            .prepare("SELECT period, paid FROM payments WHERE student_id = ?1")
            .map_err(db_err)?;
        for student in students {
            let mut payments = BTreeMap::new();
            let rows = payments_stmt
                .query_map(params![student.id.to_string()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?))
                })
                .map_err(db_err)?;
            for row in rows {
                let (period, paid) = row.map_err(db_err)?;
                let period: Month = period
                    .parse()
                    .map_err(|err: tutora_domain::MonthParseError| {
                        CoreError::Storage(err.to_string())
                    })?;
                payments.insert(period, paid);
            }
            result.push(StudentWithPayments { student, payments });
        }
        Ok(result)
    }

    /// Payment rows for one student, most recent period first.
    pub fn payments_for_student(&self, student: Uuid) -> Result<Vec<PaymentRow>> {
        // Distinguish an unknown student from one with no rows yet.
        self.get_student(student)?;
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!(
                "{PAYMENT_SELECT} WHERE student_id = ?1 ORDER BY period DESC"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![student.to_string()], row_to_payment)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    /// Flips one payment row's paid state; sets `paid_date` on the way to
    /// paid and clears it on the way back.
    pub fn toggle_payment(&self, payment_id: i64, today: NaiveDate) -> Result<PaymentRow> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let paid: bool = tx
            .query_row(
                "SELECT paid FROM payments WHERE id = ?1",
                params![payment_id],
                |row| row.get(0),
            )
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => CoreError::PaymentNotFound(payment_id),
                other => db_err(other),
            })?;
        let now_paid = !paid;
        let paid_date = now_paid.then(|| today.to_string());
        tx.execute(
            "UPDATE payments SET paid = ?2, paid_date = ?3 WHERE id = ?1",
            params![payment_id, now_paid, paid_date],
        )
        .map_err(db_err)?;
        let row = tx
            .query_row(
                &format!("{PAYMENT_SELECT} WHERE id = ?1"),
                params![payment_id],
                row_to_payment,
            )
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(row)
    }

    /// Unpaid rows whose period precedes today's month, for active students
    /// only, oldest period first.
    pub fn overdue_payments(&self, today: NaiveDate) -> Result<Vec<OverdueRow>> {
        let current = Month::from_date(today).to_string();
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT p.id, p.student_id, p.period, p.amount, p.paid, p.paid_date, \
                        s.first_name, s.last_name, s.email, s.phone \
                 FROM payments p JOIN students s ON s.id = p.student_id \
                 WHERE p.paid = 0 AND p.period < ?1 AND s.status = 'active' \
                 ORDER BY p.period ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![current], |row| {
                Ok((
                    row_to_payment(row)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                ))
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(rows
            .into_iter()
            .map(|(payment, first_name, last_name, email, phone)| {
                let days_overdue = (today - payment.period.first_day()).num_days();
                OverdueRow {
                    payment,
                    first_name,
                    last_name,
                    email,
                    phone,
                    days_overdue,
                }
            })
            .collect())
    }
}

impl SchoolStore for SqliteSchoolStore {
    fn load_students(&self) -> Result<Vec<Student>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!("{STUDENT_SELECT} ORDER BY last_name, first_name"))
            .map_err(db_err)?;
        let students = stmt
            .query_map([], row_to_student)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(students)
    }

    fn save_students(&self, students: &[Student]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute("DELETE FROM students", []).map_err(db_err)?;
        let now = Utc::now().to_rfc3339();
        for student in students {
            tx.execute(
                "INSERT INTO students (
                    id, first_name, last_name, email, phone, birth_date,
                    level_code, subscription_start, monthly_price, notes, status,
                    registration_date, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    student.id.to_string(),
                    student.first_name,
                    student.last_name,
                    student.email,
                    student.phone,
                    student.birth_date,
                    student.level.code(),
                    student.subscription_start.to_string(),
                    student.monthly_price,
                    student.notes,
                    student.status.to_string(),
                    student.registration_date.to_string(),
                    now,
                    now,
                ],
            )
            .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)?;
        Ok(())
    }

    fn load_payments(&self) -> Result<PaymentLedger> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT student_id, period, paid, paid_date FROM payments")
            .map_err(db_err)?;
        let mut ledger = PaymentLedger::new();
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .map_err(db_err)?;
        for row in rows {
            let (student, period, paid, paid_date) = row.map_err(db_err)?;
            let student: Uuid = student
                .parse()
                .map_err(|_| CoreError::Storage(format!("invalid student id `{student}`")))?;
            let period: Month = period
                .parse()
                .map_err(|err: tutora_domain::MonthParseError| CoreError::Storage(err.to_string()))?;
            let paid_date = paid_date
                .map(|raw| parse_date(&raw))
                .transpose()?;
            ledger.set(student, period, PaymentEntry { paid, paid_date });
        }
        Ok(ledger)
    }

    fn save_payments(&self, payments: &PaymentLedger) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute("DELETE FROM payments", []).map_err(db_err)?;
        {
            let mut amount_stmt = tx
                .prepare("SELECT monthly_price FROM students WHERE id = ?1")
                .map_err(db_err)?;
            let mut insert = tx
                .prepare(
                    "INSERT INTO payments (student_id, period, amount, paid, paid_date) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(db_err)?;
            for (student, period, entry) in payments.iter() {
                let amount: f64 = amount_stmt
                    .query_row(params![student.to_string()], |row| row.get(0))
                    .unwrap_or(0.0);
                insert
                    .execute(params![
                        student.to_string(),
                        period.to_string(),
                        amount,
                        entry.paid,
                        entry.paid_date.map(|date| date.to_string()),
                    ])
                    .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)?;
        Ok(())
    }

    fn export_snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot {
            students: self.load_students()?,
            payments: self.load_payments()?,
            exported_at: Utc::now(),
            version: SNAPSHOT_VERSION.to_string(),
        })
    }

    fn import_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        ensure_supported_snapshot(snapshot)?;
        let prices: std::collections::HashMap<Uuid, f64> = snapshot
            .students
            .iter()
            .map(|student| (student.id, student.monthly_price))
            .collect();
        // Replacement happens inside one transaction; any failure rolls the
        // previous state back untouched.
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute("DELETE FROM students", []).map_err(db_err)?;
        let now = Utc::now().to_rfc3339();
        for student in &snapshot.students {
            tx.execute(
                "INSERT INTO students (
                    id, first_name, last_name, email, phone, birth_date,
                    level_code, subscription_start, monthly_price, notes, status,
                    registration_date, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    student.id.to_string(),
                    student.first_name,
                    student.last_name,
                    student.email,
                    student.phone,
                    student.birth_date,
                    student.level.code(),
                    student.subscription_start.to_string(),
                    student.monthly_price,
                    student.notes,
                    student.status.to_string(),
                    student.registration_date.to_string(),
                    now,
                    now,
                ],
            )
            .map_err(db_err)?;
        }
        for (student, period, entry) in snapshot.payments.iter() {
            tx.execute(
                "INSERT INTO payments (student_id, period, amount, paid, paid_date) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    student.to_string(),
                    period.to_string(),
                    prices.get(&student).copied().unwrap_or(0.0),
                    entry.paid,
                    entry.paid_date.map(|date| date.to_string()),
                ],
            )
            .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)?;
        tracing::info!(
            students = snapshot.students.len(),
            payments = snapshot.payments.len(),
            "snapshot imported"
        );
        Ok(())
    }
}

const STUDENT_SELECT: &str = "SELECT id, first_name, last_name, email, phone, birth_date, \
     level_code, subscription_start, monthly_price, notes, status, registration_date \
     FROM students";

const PAYMENT_SELECT: &str =
    "SELECT id, student_id, period, amount, paid, paid_date FROM payments";

fn row_to_student(row: &Row<'_>) -> rusqlite::Result<Student> {
    let id: String = row.get(0)?;
    let level: String = row.get(6)?;
    let subscription: String = row.get(7)?;
    let status: String = row.get(10)?;
    let registration: String = row.get(11)?;

    Ok(Student {
        id: id
            .parse()
            .map_err(|err| conversion_err(0, Box::new(err)))?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        birth_date: row.get(5)?,
        level: level
            .parse::<Level>()
            .map_err(|err| conversion_err(6, Box::new(err)))?,
        subscription_start: subscription
            .parse::<Month>()
            .map_err(|err| conversion_err(7, Box::new(err)))?,
        monthly_price: row.get(8)?,
        notes: row.get(9)?,
        status: match status.as_str() {
            "inactive" => StudentStatus::Inactive,
            _ => StudentStatus::Active,
        },
        registration_date: NaiveDate::parse_from_str(&registration, "%Y-%m-%d")
            .map_err(|err| conversion_err(11, Box::new(err)))?,
    })
}

fn row_to_payment(row: &Row<'_>) -> rusqlite::Result<PaymentRow> {
    let student: String = row.get(1)?;
    let period: String = row.get(2)?;
    let paid_date: Option<String> = row.get(5)?;
    Ok(PaymentRow {
        id: row.get(0)?,
        student_id: student
            .parse()
            .map_err(|err| conversion_err(1, Box::new(err)))?,
        period: period
            .parse::<Month>()
            .map_err(|err| conversion_err(2, Box::new(err)))?,
        amount: row.get(3)?,
        paid: row.get(4)?,
        paid_date: paid_date
            .map(|raw| {
                NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .map_err(|err| conversion_err(5, Box::new(err)))
            })
            .transpose()?,
    })
}

fn conversion_err(
    index: usize,
    err: Box<dyn std::error::Error + Send + Sync>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, err)
}

fn seed_owed_rows(tx: &rusqlite::Transaction<'_>, student: &Student, today: NaiveDate) -> Result<()> {
    for period in
        PeriodCalendar::owed_periods(student.subscription_start, today, LOOKAHEAD_MONTHS)
    {
        tx.execute(
            "INSERT OR IGNORE INTO payments (student_id, period, amount) VALUES (?1, ?2, ?3)",
            params![
                student.id.to_string(),
                period.to_string(),
                student.monthly_price
            ],
        )
        .map_err(db_err)?;
    }
    Ok(())
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|err| CoreError::Storage(format!("invalid date `{raw}`: {err}")))
}

/// Maps driver errors into the core taxonomy. The unique-email constraint
/// surfaces as a validation failure on the email field, matching the REST
/// contract.
fn db_err(err: rusqlite::Error) -> CoreError {
    if let rusqlite::Error::SqliteFailure(_, Some(message)) = &err {
        if message.contains("students.email") {
            return CoreError::Validation(vec!["email".to_string()]);
        }
    }
    CoreError::Storage(err.to_string())
}
