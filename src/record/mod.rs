//! Versioned, audited records as they cross the persistence boundary.

use crate::core::{EntitySchema, GymResult, RecordId, RecordSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque row version. The store changes it on every successful write and
/// never hands the same value out twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionToken(u64);

impl VersionToken {
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub(crate) fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for VersionToken {
    type Err = String;

    /// Accepts the hex form produced by `Display`, optionally quoted (`If-Match` style).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_matches('"');
        if trimmed.is_empty() {
            return Err("row version must not be empty".to_string());
        }
        u64::from_str_radix(trimmed, 16)
            .map(Self)
            .map_err(|_| format!("'{trimmed}' is not a valid row version"))
    }
}

impl Serialize for VersionToken {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionToken {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Who created and last updated a row, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditStamp {
    pub created_by: String,
    pub created_on: DateTime<Utc>,
    pub updated_by: String,
    pub updated_on: DateTime<Utc>,
}

/// A row as the store returns it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub id: RecordId,
    pub version: VersionToken,
    pub fields: RecordSnapshot,
    /// `None` for tables that are not auditable.
    pub audit: Option<AuditStamp>,
}

/// Anything persisted with an identifier, a schema-described body and a version token.
pub trait VersionedRecord: Sized {
    const SCHEMA: &'static EntitySchema;

    fn from_row(row: &StoredRow) -> GymResult<Self>;

    /// Mutable field values, as a form would submit them. Never includes audit data.
    fn to_snapshot(&self) -> RecordSnapshot;

    fn id(&self) -> RecordId;

    fn version(&self) -> VersionToken;
}

/// Records carrying provenance written by the persistence boundary.
pub trait Auditable {
    fn audit(&self) -> Option<&AuditStamp>;
}

impl Auditable for StoredRow {
    fn audit(&self) -> Option<&AuditStamp> {
        self.audit.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_through_display() {
        let token = VersionToken::from_raw(0x2a);
        let text = token.to_string();
        assert_eq!(text, "000000000000002a");
        assert_eq!(text.parse::<VersionToken>().unwrap(), token);
        assert_eq!("\"2a\"".parse::<VersionToken>().unwrap(), token);
    }

    #[test]
    fn token_rejects_garbage() {
        assert!("".parse::<VersionToken>().is_err());
        assert!("xyz".parse::<VersionToken>().is_err());
    }

    #[test]
    fn token_serialises_as_string() {
        let json = serde_json::to_string(&VersionToken::from_raw(255)).unwrap();
        assert_eq!(json, "\"00000000000000ff\"");
        let back: VersionToken = serde_json::from_str(&json).unwrap();
        assert_eq!(back, VersionToken::from_raw(255));
    }
}
