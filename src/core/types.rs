use super::format::{format_currency, format_phone};
use super::{FieldValue, RecordId, StoreError, StoreResult};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::collections::btree_map;

/// Semantic type of a field; drives validation and conflict comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Float,
    Text,
    Boolean,
    Date,
    Bytes,
    /// Identifier of a row in the named table.
    Reference(&'static str),
}

impl FieldKind {
    pub fn accepts(&self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (_, FieldValue::Null)
                | (Self::Integer, FieldValue::Integer(_))
                | (Self::Float, FieldValue::Float(_))
                | (Self::Text, FieldValue::Text(_))
                | (Self::Boolean, FieldValue::Boolean(_))
                | (Self::Date, FieldValue::Date(_))
                | (Self::Bytes, FieldValue::Bytes(_))
                | (Self::Reference(_), FieldValue::Reference(_))
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::Text => "TEXT",
            Self::Boolean => "BOOLEAN",
            Self::Date => "DATE",
            Self::Bytes => "BYTES",
            Self::Reference(_) => "REFERENCE",
        }
    }
}

/// How a stored value is rendered back to a user ("Current value: ...").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayFormat {
    Plain,
    ShortDate,
    Currency,
    Phone,
}

impl DisplayFormat {
    pub fn render(&self, value: &FieldValue) -> String {
        match (self, value) {
            (_, FieldValue::Null) => String::new(),
            (Self::ShortDate, FieldValue::Date(date)) => date.format("%Y-%m-%d").to_string(),
            (Self::Currency, FieldValue::Float(amount)) => format_currency(*amount),
            (Self::Currency, FieldValue::Integer(amount)) => format_currency(*amount as f64),
            (Self::Phone, FieldValue::Text(phone)) => format_phone(phone),
            (_, other) => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
    /// Immutable fields are fixed at creation and never accepted by an edit.
    pub mutable: bool,
    pub display: DisplayFormat,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            mutable: true,
            display: DisplayFormat::Plain,
        }
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }

    pub const fn display(mut self, display: DisplayFormat) -> Self {
        self.display = display;
        self
    }

    pub fn validate(&self, value: &FieldValue) -> StoreResult<()> {
        if value.is_null() {
            if !self.nullable {
                return Err(StoreError::Schema(format!(
                    "Field '{}' cannot be NULL",
                    self.name
                )));
            }
            return Ok(());
        }

        if !self.kind.accepts(value) {
            return Err(StoreError::Schema(format!(
                "Field '{}' expects type {}, got {}",
                self.name,
                self.kind.name(),
                value.type_name()
            )));
        }

        Ok(())
    }
}

/// Table-driven description of one entity: what the store validates and what
/// the conflict reconciler diffs.
#[derive(Debug, Clone, Copy)]
pub struct EntitySchema {
    pub table: &'static str,
    /// Friendly singular name used in messages ("Client", "Fitness Category").
    pub entity: &'static str,
    pub fields: &'static [FieldSpec],
    /// Human-readable label of a row, used when another record references it.
    pub summary: fn(&RecordSnapshot) -> String,
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn mutable_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|field| field.mutable)
    }

    pub fn references(&self) -> impl Iterator<Item = (&FieldSpec, &'static str)> {
        self.fields.iter().filter_map(|field| match field.kind {
            FieldKind::Reference(table) => Some((field, table)),
            _ => None,
        })
    }

    /// Checks every supplied value against its field spec. Unknown names are rejected.
    pub fn validate_partial(&self, snapshot: &RecordSnapshot) -> StoreResult<()> {
        for (name, value) in snapshot.iter() {
            let spec = self.field(name).ok_or_else(|| {
                StoreError::Schema(format!("Unknown field '{}' for table '{}'", name, self.table))
            })?;
            spec.validate(value)?;
        }
        Ok(())
    }

    /// Like [`validate_partial`](Self::validate_partial) but also requires every
    /// non-nullable field to be present.
    pub fn validate_complete(&self, snapshot: &RecordSnapshot) -> StoreResult<()> {
        self.validate_partial(snapshot)?;
        for field in self.fields {
            if !field.nullable && !snapshot.contains(field.name) {
                return Err(StoreError::Schema(format!(
                    "Field '{}' is required for table '{}'",
                    field.name, self.table
                )));
            }
        }
        Ok(())
    }

    pub fn summarize(&self, snapshot: &RecordSnapshot) -> String {
        (self.summary)(snapshot)
    }
}

/// Field values keyed by field name: a submitted form or a stored row body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSnapshot {
    fields: BTreeMap<String, FieldValue>,
}

impl RecordSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Missing fields read as NULL.
    pub fn value(&self, name: &str) -> &FieldValue {
        const NULL: &FieldValue = &FieldValue::Null;
        self.fields.get(name).unwrap_or(NULL)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, FieldValue> {
        self.fields.iter()
    }

    /// Overlays `other` on top of `self`.
    pub fn merge(&mut self, other: &RecordSnapshot) {
        for (name, value) in other.iter() {
            self.fields.insert(name.clone(), value.clone());
        }
    }

    /// Keeps only the named fields.
    pub fn retain_fields(&mut self, allowed: &[&str]) {
        self.fields.retain(|name, _| allowed.contains(&name.as_str()));
    }

    pub fn text(&self, name: &str) -> StoreResult<String> {
        self.value(name)
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch(name, "TEXT", self.value(name)))
    }

    pub fn opt_text(&self, name: &str) -> StoreResult<Option<String>> {
        match self.value(name) {
            FieldValue::Null => Ok(None),
            other => other
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| mismatch(name, "TEXT", other)),
        }
    }

    pub fn integer(&self, name: &str) -> StoreResult<i64> {
        match self.value(name) {
            FieldValue::Integer(i) => Ok(*i),
            other => Err(mismatch(name, "INTEGER", other)),
        }
    }

    pub fn float(&self, name: &str) -> StoreResult<f64> {
        match self.value(name) {
            FieldValue::Float(f) => Ok(*f),
            other => Err(mismatch(name, "FLOAT", other)),
        }
    }

    pub fn boolean(&self, name: &str) -> StoreResult<bool> {
        self.value(name)
            .as_bool()
            .ok_or_else(|| mismatch(name, "BOOLEAN", self.value(name)))
    }

    pub fn date(&self, name: &str) -> StoreResult<NaiveDate> {
        self.value(name)
            .as_date()
            .ok_or_else(|| mismatch(name, "DATE", self.value(name)))
    }

    pub fn opt_date(&self, name: &str) -> StoreResult<Option<NaiveDate>> {
        match self.value(name) {
            FieldValue::Null => Ok(None),
            other => other
                .as_date()
                .map(Some)
                .ok_or_else(|| mismatch(name, "DATE", other)),
        }
    }

    pub fn reference(&self, name: &str) -> StoreResult<RecordId> {
        self.value(name)
            .as_reference()
            .ok_or_else(|| mismatch(name, "REFERENCE", self.value(name)))
    }

    pub fn opt_reference(&self, name: &str) -> StoreResult<Option<RecordId>> {
        match self.value(name) {
            FieldValue::Null => Ok(None),
            other => other
                .as_reference()
                .map(Some)
                .ok_or_else(|| mismatch(name, "REFERENCE", other)),
        }
    }
}

impl<'a> IntoIterator for &'a RecordSnapshot {
    type Item = (&'a String, &'a FieldValue);
    type IntoIter = btree_map::Iter<'a, String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

fn mismatch(name: &str, expected: &str, got: &FieldValue) -> StoreError {
    StoreError::Schema(format!(
        "Field '{}' expects type {}, got {}",
        name,
        expected,
        got.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &[FieldSpec] = &[
        FieldSpec::new("name", FieldKind::Text),
        FieldSpec::new("notes", FieldKind::Text).nullable(),
        FieldSpec::new("owner_id", FieldKind::Reference("Owners")),
        FieldSpec::new("code", FieldKind::Integer).immutable(),
    ];

    fn summary(snapshot: &RecordSnapshot) -> String {
        snapshot.value("name").to_string()
    }

    const SCHEMA: EntitySchema = EntitySchema {
        table: "Widgets",
        entity: "Widget",
        fields: FIELDS,
        summary,
    };

    #[test]
    fn validate_complete_requires_non_nullable_fields() {
        let partial = RecordSnapshot::new().with("name", "Bolt");
        assert!(SCHEMA.validate_partial(&partial).is_ok());
        assert!(SCHEMA.validate_complete(&partial).is_err());

        let complete = partial
            .with("owner_id", FieldValue::Reference(1))
            .with("code", 7_i64);
        assert!(SCHEMA.validate_complete(&complete).is_ok());
    }

    #[test]
    fn validate_rejects_unknown_fields_and_wrong_types() {
        let unknown = RecordSnapshot::new().with("colour", "red");
        assert!(SCHEMA.validate_partial(&unknown).is_err());

        let wrong = RecordSnapshot::new().with("code", "seven");
        assert!(SCHEMA.validate_partial(&wrong).is_err());

        let null_name = RecordSnapshot::new().with("name", FieldValue::Null);
        assert!(SCHEMA.validate_partial(&null_name).is_err());
    }

    #[test]
    fn mutable_fields_skip_immutable_ones() {
        let names: Vec<_> = SCHEMA.mutable_fields().map(|f| f.name).collect();
        assert_eq!(names, vec!["name", "notes", "owner_id"]);
        assert_eq!(SCHEMA.references().count(), 1);
    }

    #[test]
    fn retain_fields_drops_everything_else() {
        let mut snapshot = RecordSnapshot::new()
            .with("name", "Bolt")
            .with("code", 1_i64);
        snapshot.retain_fields(&["name"]);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains("name"));
    }

    #[test]
    fn display_formats_render_current_values() {
        assert_eq!(
            DisplayFormat::Currency.render(&FieldValue::Float(1234.5)),
            "$1,234.50"
        );
        assert_eq!(
            DisplayFormat::Phone.render(&FieldValue::from("9055551234")),
            "(905) 555-1234"
        );
        assert_eq!(DisplayFormat::Plain.render(&FieldValue::Null), "");
    }
}
