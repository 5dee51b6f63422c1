use super::catalog::UniqueIndex;
use super::{ConstraintKind, ConstraintViolation};
use crate::core::{FieldValue, RecordId, RecordSnapshot};
use crate::record::StoredRow;
use std::collections::BTreeMap;

/// Live rows of one table, ordered by id.
#[derive(Debug, Clone)]
pub struct Table {
    name: &'static str,
    rows: BTreeMap<RecordId, StoredRow>,
    next_id: RecordId,
}

impl Table {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, id: RecordId) -> Option<&StoredRow> {
        self.rows.get(&id)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.rows.contains_key(&id)
    }

    pub fn rows(&self) -> impl Iterator<Item = &StoredRow> {
        self.rows.values()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Hands out the next identifier. Identifiers are never reused.
    pub fn allocate_id(&mut self) -> RecordId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn put(&mut self, row: StoredRow) {
        self.rows.insert(row.id, row);
    }

    pub fn remove(&mut self, id: RecordId) -> Option<StoredRow> {
        self.rows.remove(&id)
    }

    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut StoredRow> {
        self.rows.get_mut(&id)
    }

    /// Ids of rows whose `field` references `target`.
    pub fn referencing(&self, field: &str, target: RecordId) -> Vec<RecordId> {
        self.rows
            .values()
            .filter(|row| row.fields.value(field).as_reference() == Some(target))
            .map(|row| row.id)
            .collect()
    }

    /// Checks `candidate` against every unique index, skipping the row being
    /// replaced. A key containing NULL never collides.
    pub fn check_unique(
        &self,
        indexes: &[UniqueIndex],
        candidate: &RecordSnapshot,
        ignore_id: Option<RecordId>,
    ) -> Result<(), ConstraintViolation> {
        for index in indexes {
            let key: Vec<&FieldValue> = index.fields.iter().map(|f| candidate.value(f)).collect();
            if key.iter().any(|value| value.is_null()) {
                continue;
            }

            let taken = self.rows.values().any(|row| {
                Some(row.id) != ignore_id
                    && index
                        .fields
                        .iter()
                        .zip(&key)
                        .all(|(field, value)| row.fields.value(field).semantic_eq(value))
            });

            if taken {
                return Err(ConstraintViolation {
                    table: self.name.to_string(),
                    kind: ConstraintKind::Unique {
                        constraint: index.name.to_string(),
                        fields: index.fields.iter().map(|f| f.to_string()).collect(),
                    },
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::VersionToken;

    const EMAIL: &[UniqueIndex] = &[UniqueIndex {
        name: "Clients.Email",
        fields: &["email"],
    }];

    fn row(id: RecordId, email: &str) -> StoredRow {
        StoredRow {
            id,
            version: VersionToken::from_raw(id as u64),
            fields: RecordSnapshot::new().with("email", email),
            audit: None,
        }
    }

    #[test]
    fn unique_check_ignores_the_row_being_replaced() {
        let mut table = Table::new("Clients");
        table.put(row(1, "a@gym.com"));

        let same = RecordSnapshot::new().with("email", "a@gym.com");
        assert!(table.check_unique(EMAIL, &same, Some(1)).is_ok());

        let err = table.check_unique(EMAIL, &same, None).unwrap_err();
        assert_eq!(err.constraint_name(), "Clients.Email");
        assert_eq!(err.field(), Some("email"));
    }

    #[test]
    fn unique_text_is_case_sensitive_and_null_never_collides() {
        let mut table = Table::new("Clients");
        table.put(row(1, "a@gym.com"));

        let shouting = RecordSnapshot::new().with("email", "A@GYM.COM");
        assert!(table.check_unique(EMAIL, &shouting, None).is_ok());

        let null = RecordSnapshot::new().with("email", FieldValue::Null);
        assert!(table.check_unique(EMAIL, &null, None).is_ok());
    }

    #[test]
    fn ids_are_never_reused() {
        let mut table = Table::new("Clients");
        let first = table.allocate_id();
        table.put(row(first, "a@gym.com"));
        table.remove(first);
        assert_eq!(table.allocate_id(), first + 1);
    }
}
