//! Domain types representing enrolled students.

use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::month::Month;

/// Grade levels offered by the school, from primary through university.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Cp,
    Ce1,
    Ce2,
    Cm1,
    Cm2,
    Sixieme,
    Cinquieme,
    Quatrieme,
    Troisieme,
    Seconde,
    Premiere,
    Terminale,
    Sup,
    Spe,
    Licence,
    Master,
}

impl Level {
    /// Every level in curriculum order; distributions iterate this so
    /// zero-count levels still appear.
    pub const ALL: [Level; 16] = [
        Level::Cp,
        Level::Ce1,
        Level::Ce2,
        Level::Cm1,
        Level::Cm2,
        Level::Sixieme,
        Level::Cinquieme,
        Level::Quatrieme,
        Level::Troisieme,
        Level::Seconde,
        Level::Premiere,
        Level::Terminale,
        Level::Sup,
        Level::Spe,
        Level::Licence,
        Level::Master,
    ];

    /// The display code used on forms, in storage, and on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Level::Cp => "CP",
            Level::Ce1 => "CE1",
            Level::Ce2 => "CE2",
            Level::Cm1 => "CM1",
            Level::Cm2 => "CM2",
            Level::Sixieme => "6ème",
            Level::Cinquieme => "5ème",
            Level::Quatrieme => "4ème",
            Level::Troisieme => "3ème",
            Level::Seconde => "2nde",
            Level::Premiere => "1ère",
            Level::Terminale => "Terminale",
            Level::Sup => "Sup",
            Level::Spe => "Spé",
            Level::Licence => "Licence",
            Level::Master => "Master",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error produced when a string is not one of the known level codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelParseError(pub String);

impl fmt::Display for LevelParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown level `{}`", self.0)
    }
}

impl std::error::Error for LevelParseError {}

impl FromStr for Level {
    type Err = LevelParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .iter()
            .find(|level| level.code() == value)
            .copied()
            .ok_or_else(|| LevelParseError(value.to_string()))
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Whether a student currently attends; absent in old documents means active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    #[default]
    Active,
    Inactive,
}

impl fmt::Display for StudentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StudentStatus::Active => "active",
            StudentStatus::Inactive => "inactive",
        };
        f.write_str(label)
    }
}

/// An enrolled student and their subscription attributes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Student {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    pub level: Level,
    /// First billed period; every owed month derives from this.
    pub subscription_start: Month,
    #[serde(default)]
    pub monthly_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: StudentStatus,
    /// Set once at creation, preserved across edits.
    pub registration_date: NaiveDate,
}

impl Student {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        level: Level,
        subscription_start: Month,
        registration_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: None,
            phone: None,
            birth_date: None,
            level,
            subscription_start,
            monthly_price: 0.0,
            notes: None,
            status: StudentStatus::Active,
            registration_date,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_active(&self) -> bool {
        self.status == StudentStatus::Active
    }
}
