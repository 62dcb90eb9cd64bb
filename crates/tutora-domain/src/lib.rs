//! tutora-domain
//!
//! Pure domain models for the school roster (Student, Month, PaymentLedger,
//! School, Snapshot). No I/O, no services, no storage. Only data types and
//! core enums.

pub mod ledger;
pub mod month;
pub mod school;
pub mod student;

pub use ledger::*;
pub use month::*;
pub use school::*;
pub use student::*;
