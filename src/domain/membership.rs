use crate::core::format::format_currency;
use crate::core::{
    DisplayFormat, EntitySchema, FieldKind, FieldSpec, GymResult, RecordId, RecordSnapshot,
};
use crate::record::{AuditStamp, StoredRow, VersionToken, VersionedRecord};
use serde::Serialize;

const FIELDS: &[FieldSpec] = &[
    FieldSpec::new("type", FieldKind::Text),
    FieldSpec::new("standard_fee", FieldKind::Float).display(DisplayFormat::Currency),
];

fn summary(snapshot: &RecordSnapshot) -> String {
    let fee = snapshot.value("standard_fee").as_f64().unwrap_or_default();
    format!("{} - {}", snapshot.value("type"), format_currency(fee))
}

pub static MEMBERSHIP_TYPES: EntitySchema = EntitySchema {
    table: "MembershipTypes",
    entity: "Membership Type",
    fields: FIELDS,
    summary,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MembershipType {
    pub id: RecordId,
    pub row_version: VersionToken,
    #[serde(rename = "type")]
    pub type_name: String,
    pub standard_fee: f64,
    pub audit: Option<AuditStamp>,
}

impl MembershipType {
    pub fn summary(&self) -> String {
        summary(&self.to_snapshot())
    }
}

impl VersionedRecord for MembershipType {
    const SCHEMA: &'static EntitySchema = &MEMBERSHIP_TYPES;

    fn from_row(row: &StoredRow) -> GymResult<Self> {
        Ok(Self {
            id: row.id,
            row_version: row.version,
            type_name: row.fields.text("type")?,
            standard_fee: row.fields.float("standard_fee")?,
            audit: row.audit.clone(),
        })
    }

    fn to_snapshot(&self) -> RecordSnapshot {
        RecordSnapshot::new()
            .with("type", self.type_name.as_str())
            .with("standard_fee", self.standard_fee)
    }

    fn id(&self) -> RecordId {
        self.id
    }

    fn version(&self) -> VersionToken {
        self.row_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_shows_type_and_fee() {
        let snapshot = RecordSnapshot::new()
            .with("type", "Premium")
            .with("standard_fee", 1250.0);
        assert_eq!(MEMBERSHIP_TYPES.summarize(&snapshot), "Premium - $1,250.00");
    }
}
