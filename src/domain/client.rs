use super::schedule::full_name;
use crate::core::format::format_phone;
use crate::core::{
    DisplayFormat, EntitySchema, FieldKind, FieldSpec, FieldValue, GymResult, RecordId,
    RecordSnapshot,
};
use crate::record::{AuditStamp, StoredRow, VersionToken, VersionedRecord};
use chrono::NaiveDate;
use serde::Serialize;

const FIELDS: &[FieldSpec] = &[
    FieldSpec::new("membership_number", FieldKind::Integer),
    FieldSpec::new("first_name", FieldKind::Text),
    FieldSpec::new("middle_name", FieldKind::Text).nullable(),
    FieldSpec::new("last_name", FieldKind::Text),
    FieldSpec::new("phone", FieldKind::Text).display(DisplayFormat::Phone),
    FieldSpec::new("email", FieldKind::Text),
    FieldSpec::new("dob", FieldKind::Date).display(DisplayFormat::ShortDate),
    FieldSpec::new("postal_code", FieldKind::Text),
    FieldSpec::new("health_condition", FieldKind::Text),
    FieldSpec::new("notes", FieldKind::Text).nullable(),
    FieldSpec::new("membership_start_date", FieldKind::Date).display(DisplayFormat::ShortDate),
    FieldSpec::new("membership_end_date", FieldKind::Date).display(DisplayFormat::ShortDate),
    FieldSpec::new("membership_fee", FieldKind::Float).display(DisplayFormat::Currency),
    FieldSpec::new("fee_paid", FieldKind::Boolean),
    FieldSpec::new("membership_type_id", FieldKind::Reference("MembershipTypes")),
];

pub static CLIENTS: EntitySchema = EntitySchema {
    table: "Clients",
    entity: "Client",
    fields: FIELDS,
    summary: full_name,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Client {
    pub id: RecordId,
    pub row_version: VersionToken,
    pub membership_number: i64,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    pub dob: NaiveDate,
    pub postal_code: String,
    pub health_condition: String,
    pub notes: Option<String>,
    pub membership_start_date: NaiveDate,
    pub membership_end_date: NaiveDate,
    pub membership_fee: f64,
    pub fee_paid: bool,
    pub membership_type_id: RecordId,
    pub audit: Option<AuditStamp>,
}

impl Client {
    /// "First M. Last"
    pub fn summary(&self) -> String {
        full_name(&self.to_snapshot())
    }

    /// "Last, First M."
    pub fn formal_name(&self) -> String {
        match self.middle_name.as_deref().and_then(|m| m.chars().next()) {
            Some(initial) => format!(
                "{}, {} {}.",
                self.last_name,
                self.first_name,
                initial.to_uppercase()
            ),
            None => format!("{}, {}", self.last_name, self.first_name),
        }
    }

    pub fn phone_formatted(&self) -> String {
        format_phone(&self.phone)
    }

    pub fn created_by(&self) -> Option<&str> {
        self.audit.as_ref().map(|audit| audit.created_by.as_str())
    }
}

impl VersionedRecord for Client {
    const SCHEMA: &'static EntitySchema = &CLIENTS;

    fn from_row(row: &StoredRow) -> GymResult<Self> {
        let f = &row.fields;
        Ok(Self {
            id: row.id,
            row_version: row.version,
            membership_number: f.integer("membership_number")?,
            first_name: f.text("first_name")?,
            middle_name: f.opt_text("middle_name")?,
            last_name: f.text("last_name")?,
            phone: f.text("phone")?,
            email: f.text("email")?,
            dob: f.date("dob")?,
            postal_code: f.text("postal_code")?,
            health_condition: f.text("health_condition")?,
            notes: f.opt_text("notes")?,
            membership_start_date: f.date("membership_start_date")?,
            membership_end_date: f.date("membership_end_date")?,
            membership_fee: f.float("membership_fee")?,
            fee_paid: f.boolean("fee_paid")?,
            membership_type_id: f.reference("membership_type_id")?,
            audit: row.audit.clone(),
        })
    }

    fn to_snapshot(&self) -> RecordSnapshot {
        RecordSnapshot::new()
            .with("membership_number", self.membership_number)
            .with("first_name", self.first_name.as_str())
            .with("middle_name", self.middle_name.clone())
            .with("last_name", self.last_name.as_str())
            .with("phone", self.phone.as_str())
            .with("email", self.email.as_str())
            .with("dob", self.dob)
            .with("postal_code", self.postal_code.as_str())
            .with("health_condition", self.health_condition.as_str())
            .with("notes", self.notes.clone())
            .with("membership_start_date", self.membership_start_date)
            .with("membership_end_date", self.membership_end_date)
            .with("membership_fee", self.membership_fee)
            .with("fee_paid", self.fee_paid)
            .with("membership_type_id", FieldValue::Reference(self.membership_type_id))
    }

    fn id(&self) -> RecordId {
        self.id
    }

    fn version(&self) -> VersionToken {
        self.row_version
    }
}
