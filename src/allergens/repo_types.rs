use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Mild,
    #[default]
    Moderate,
    Severe,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mild" => Ok(Severity::Mild),
            "moderate" => Ok(Severity::Moderate),
            "severe" => Ok(Severity::Severe),
            other => anyhow::bail!("unknown severity level {other:?}"),
        }
    }
}

#[derive(Debug, FromRow)]
pub struct AllergenRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub severity_level: String,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allergen {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<AllergenRow> for Allergen {
    fn from(r: AllergenRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            description: r.description,
            // the column is check-constrained; fall back rather than fail a read
            severity: r.severity_level.parse().unwrap_or_default(),
            is_active: r.is_active,
            created_at: r.created_at,
        }
    }
}
