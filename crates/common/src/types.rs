//! Stats snapshot, cache key, and resolution types.
//!
//! Field names on the wire are fixed by the stats card that consumes them,
//! so every rename below is part of the public contract.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::Error;

/// Flat field map (name → string or integer) as returned to callers and
/// persisted in the store.
pub type Fields = Map<String, Value>;

/// Name of the key field inside a persisted record.
pub const DATE_FIELD: &str = "date";

// ── Snapshot ──────────────────────────────────────────────────────────

/// Statistics for the tracked account on one calendar day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    #[serde(rename = "Rank")]
    pub rank: String,
    #[serde(rename = "User_Global_Rank")]
    pub global_rank: u64,
    /// Omitted entirely when the country leaderboard could not place the user.
    #[serde(rename = "Local_Rank", skip_serializing_if = "Option::is_none")]
    pub local_rank: Option<u64>,
    #[serde(rename = "System_Owns")]
    pub system_owns: u64,
    #[serde(rename = "User_Owns")]
    pub user_owns: u64,
    #[serde(rename = "Challenge_Owns")]
    pub challenge_owns: u64,
    #[serde(rename = "System_Bloods")]
    pub system_bloods: u64,
    #[serde(rename = "User_Bloods")]
    pub user_bloods: u64,
}

impl StatsSnapshot {
    /// Flatten into the wire field map.
    pub fn to_fields(&self) -> Result<Fields, Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(Error::Store(format!(
                "snapshot serialized to non-object value: {other}"
            ))),
        }
    }
}

// ── Cache key ─────────────────────────────────────────────────────────

/// Calendar date in `YYYY-MM-DD` form; one persisted record per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_date(date: NaiveDate) -> Self {
        Self(date.format("%Y-%m-%d").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A record holding only this key: "fetch failed today, don't retry".
    pub fn sentinel_record(&self) -> Fields {
        let mut record = Fields::new();
        record.insert(DATE_FIELD.to_string(), Value::String(self.0.clone()));
        record
    }

    /// Prefix `fields` with this key to form a persisted record.
    pub fn record_with(&self, fields: &Fields) -> Fields {
        let mut record = self.sentinel_record();
        for (name, value) in fields {
            record.insert(name.clone(), value.clone());
        }
        record
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Resolution ────────────────────────────────────────────────────────

/// Outcome of one trigger: either the stats mapping or a flat error mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Resolution {
    Stats(Fields),
    Failed {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl Resolution {
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
            detail: None,
        }
    }

    pub fn failed_with(error: impl Into<String>, detail: impl fmt::Display) -> Self {
        Self::Failed {
            error: error.into(),
            detail: Some(detail.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// The stats fields, if this resolution succeeded.
    pub fn fields(&self) -> Option<&Fields> {
        match self {
            Self::Stats(fields) => Some(fields),
            Self::Failed { .. } => None,
        }
    }

    /// Render as the flat JSON object handed back to callers.
    pub fn into_mapping(self) -> Fields {
        match self {
            Self::Stats(fields) => fields,
            Self::Failed { error, detail } => {
                let mut map = Fields::new();
                map.insert("error".to_string(), Value::String(error));
                if let Some(detail) = detail {
                    map.insert("detail".to_string(), Value::String(detail));
                }
                map
            }
        }
    }
}
