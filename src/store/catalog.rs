use crate::core::{EntitySchema, StoreError, StoreResult};
use std::collections::BTreeMap;

/// What deleting a parent row does to rows that reference it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePolicy {
    /// The parent delete is rejected while dependents exist.
    Restrict,
    /// Dependents are deleted together with the parent.
    Cascade,
}

/// A reference field on `dependent` pointing at rows of `parent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Reported on a restricted delete. By convention the dependent table name.
    pub name: &'static str,
    pub parent: &'static str,
    pub dependent: &'static str,
    pub field: &'static str,
    pub on_delete: DeletePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueIndex {
    /// `Table.Field` or `Table.FieldA_FieldB`.
    pub name: &'static str,
    pub fields: &'static [&'static str],
}

#[derive(Debug, Clone)]
pub struct TableDef {
    pub schema: &'static EntitySchema,
    pub auditable: bool,
    pub unique: Vec<UniqueIndex>,
}

/// Every table the store knows, with its unique indexes and relationships.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: BTreeMap<&'static str, TableDef>,
    relationships: Vec<Relationship>,
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    pub fn table(&self, name: &str) -> StoreResult<&TableDef> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::UnknownTable(name.to_string()))
    }

    pub fn schema(&self, name: &str) -> StoreResult<&'static EntitySchema> {
        self.table(name).map(|def| def.schema)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.values()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tables.keys().copied()
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Relationships in which `table` is the parent.
    pub fn dependents_of<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a Relationship> + 'a {
        self.relationships
            .iter()
            .filter(move |rel| rel.parent == table)
    }
}

#[derive(Debug, Default)]
pub struct CatalogBuilder {
    tables: BTreeMap<&'static str, TableDef>,
    relationships: Vec<Relationship>,
    errors: Vec<String>,
}

impl CatalogBuilder {
    pub fn table(mut self, schema: &'static EntitySchema, auditable: bool) -> Self {
        self.tables.insert(
            schema.table,
            TableDef {
                schema,
                auditable,
                unique: Vec::new(),
            },
        );
        self
    }

    pub fn unique(mut self, table: &'static str, name: &'static str, fields: &'static [&'static str]) -> Self {
        match self.tables.get_mut(table) {
            Some(def) => def.unique.push(UniqueIndex { name, fields }),
            None => self.errors.push(format!(
                "Unique index '{name}' declared on unregistered table '{table}'"
            )),
        }
        self
    }

    pub fn relationship(
        mut self,
        parent: &'static str,
        dependent: &'static str,
        field: &'static str,
        on_delete: DeletePolicy,
    ) -> Self {
        self.relationships.push(Relationship {
            name: dependent,
            parent,
            dependent,
            field,
            on_delete,
        });
        self
    }

    /// Checks that every reference field has exactly one declared relationship
    /// and that every index and relationship names real tables and fields.
    pub fn build(self) -> StoreResult<Catalog> {
        if let Some(first) = self.errors.into_iter().next() {
            return Err(StoreError::Schema(first));
        }

        for def in self.tables.values() {
            for index in &def.unique {
                for field in index.fields {
                    if def.schema.field(field).is_none() {
                        return Err(StoreError::Schema(format!(
                            "Unique index '{}' names unknown field '{}'",
                            index.name, field
                        )));
                    }
                }
            }
        }

        for rel in &self.relationships {
            let dependent = self.tables.get(rel.dependent).ok_or_else(|| {
                StoreError::Schema(format!(
                    "Relationship '{}' names unregistered table '{}'",
                    rel.name, rel.dependent
                ))
            })?;
            if !self.tables.contains_key(rel.parent) {
                return Err(StoreError::Schema(format!(
                    "Relationship '{}' names unregistered table '{}'",
                    rel.name, rel.parent
                )));
            }
            match dependent.schema.field(rel.field).map(|spec| spec.kind) {
                Some(crate::core::FieldKind::Reference(target)) if target == rel.parent => {}
                _ => {
                    return Err(StoreError::Schema(format!(
                        "Relationship '{}': {}.{} is not a reference to {}",
                        rel.name, rel.dependent, rel.field, rel.parent
                    )));
                }
            }
        }

        for def in self.tables.values() {
            for (field, target) in def.schema.references() {
                let declared = self
                    .relationships
                    .iter()
                    .filter(|rel| rel.dependent == def.schema.table && rel.field == field.name)
                    .count();
                if declared != 1 {
                    return Err(StoreError::Schema(format!(
                        "{}.{} -> {} needs exactly one delete policy, found {}",
                        def.schema.table, field.name, target, declared
                    )));
                }
            }
        }

        Ok(Catalog {
            tables: self.tables,
            relationships: self.relationships,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldKind, FieldSpec, RecordSnapshot};

    fn label(snapshot: &RecordSnapshot) -> String {
        snapshot.value("name").to_string()
    }

    static OWNERS: EntitySchema = EntitySchema {
        table: "Owners",
        entity: "Owner",
        fields: &[FieldSpec::new("name", FieldKind::Text)],
        summary: label,
    };

    static PETS: EntitySchema = EntitySchema {
        table: "Pets",
        entity: "Pet",
        fields: &[
            FieldSpec::new("name", FieldKind::Text),
            FieldSpec::new("owner_id", FieldKind::Reference("Owners")),
        ],
        summary: label,
    };

    #[test]
    fn reference_without_policy_is_rejected() {
        let err = Catalog::builder()
            .table(&OWNERS, true)
            .table(&PETS, true)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Pets.owner_id"));
    }

    #[test]
    fn unique_index_on_unknown_field_is_rejected() {
        let result = Catalog::builder()
            .table(&OWNERS, true)
            .unique("Owners", "Owners.Email", &["email"])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn unique_index_on_unregistered_table_is_rejected() {
        let result = Catalog::builder().unique("Ghosts", "Ghosts.Name", &["name"]).build();
        assert!(result.is_err());
    }

    #[test]
    fn dependents_are_listed_by_parent() {
        let catalog = Catalog::builder()
            .table(&OWNERS, true)
            .table(&PETS, true)
            .relationship("Owners", "Pets", "owner_id", DeletePolicy::Restrict)
            .build()
            .unwrap();
        let names: Vec<_> = catalog.dependents_of("Owners").map(|rel| rel.name).collect();
        assert_eq!(names, vec!["Pets"]);
        assert!(catalog.table("Vets").is_err());
    }
}
