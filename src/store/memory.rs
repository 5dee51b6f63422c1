use super::catalog::{Catalog, DeletePolicy, TableDef};
use super::table::Table;
use super::{
    CommitOutcome, ConstraintKind, ConstraintViolation, OpResult, Rejection, Store, WriteBatch,
    WriteOp,
};
use crate::audit::{ActorContext, AuditStamper, Clock, EntryState, TrackedEntry};
use crate::core::{RecordId, RecordSnapshot, StoreError, StoreResult};
use crate::record::{StoredRow, VersionToken};
use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Outcome of applying one operation to the staging area.
type Step<T> = StoreResult<Result<T, Rejection>>;

#[derive(Debug)]
struct Database {
    tables: HashMap<&'static str, Table>,
    /// Last version token handed out, shared by all tables.
    last_version: u64,
}

/// Copy-on-write view over the database for the duration of one commit.
/// Tables are cloned the first time an operation writes to them.
struct Staging<'a> {
    base: &'a Database,
    touched: HashMap<&'static str, Table>,
    last_version: u64,
}

impl<'a> Staging<'a> {
    fn new(base: &'a Database) -> Self {
        Self {
            base,
            touched: HashMap::new(),
            last_version: base.last_version,
        }
    }

    fn table(&self, name: &str) -> StoreResult<&Table> {
        self.touched
            .get(name)
            .or_else(|| self.base.tables.get(name))
            .ok_or_else(|| StoreError::UnknownTable(name.to_string()))
    }

    fn table_mut(&mut self, name: &'static str) -> StoreResult<&mut Table> {
        match self.touched.entry(name) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let base = self
                    .base
                    .tables
                    .get(name)
                    .ok_or_else(|| StoreError::UnknownTable(name.to_string()))?;
                Ok(entry.insert(base.clone()))
            }
        }
    }

    fn next_version(&mut self) -> VersionToken {
        self.last_version += 1;
        VersionToken::from_raw(self.last_version)
    }

    fn finish(self) -> (HashMap<&'static str, Table>, u64) {
        (self.touched, self.last_version)
    }
}

struct Applied {
    result: OpResult,
    /// Audited rows the operation touched, handed to the stamper together.
    audit: Vec<(&'static str, RecordId, TrackedEntry)>,
}

/// Process-local [`Store`]: one lock over all tables, audit stamping and
/// relationship policies enforced inside `commit`.
#[derive(Debug)]
pub struct MemoryStore {
    catalog: Arc<Catalog>,
    stamper: AuditStamper,
    db: RwLock<Database>,
}

impl MemoryStore {
    pub fn new(catalog: Catalog) -> Self {
        Self::with_stamper(catalog, AuditStamper::default())
    }

    pub fn with_clock(catalog: Catalog, clock: Arc<dyn Clock>) -> Self {
        Self::with_stamper(catalog, AuditStamper::new(clock))
    }

    pub fn with_stamper(catalog: Catalog, stamper: AuditStamper) -> Self {
        let tables = catalog
            .table_names()
            .map(|name| (name, Table::new(name)))
            .collect();
        Self {
            catalog: Arc::new(catalog),
            stamper,
            db: RwLock::new(Database {
                tables,
                last_version: 0,
            }),
        }
    }

    pub async fn row_count(&self, table: &str) -> StoreResult<usize> {
        let db = self.db.read().await;
        db.tables
            .get(table)
            .map(Table::row_count)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }

    fn apply_insert(&self, staging: &mut Staging<'_>, table: &str, fields: &RecordSnapshot) -> Step<Applied> {
        let def = self.catalog.table(table)?;
        let name = def.schema.table;
        def.schema.validate_complete(fields)?;

        if let Err(rejection) = check_references(staging, def, fields)? {
            return Ok(Err(rejection));
        }
        if let Err(violation) = staging.table(name)?.check_unique(&def.unique, fields, None) {
            return Ok(Err(Rejection::Constraint(violation)));
        }

        let version = staging.next_version();
        let target = staging.table_mut(name)?;
        let row = StoredRow {
            id: target.allocate_id(),
            version,
            fields: fields.clone(),
            audit: None,
        };
        target.put(row.clone());

        Ok(Ok(Applied {
            audit: def
                .auditable
                .then(|| (name, row.id, TrackedEntry::added()))
                .into_iter()
                .collect(),
            result: OpResult::Inserted(row),
        }))
    }

    fn apply_update(
        &self,
        staging: &mut Staging<'_>,
        table: &str,
        id: RecordId,
        expected: VersionToken,
        fields: &RecordSnapshot,
    ) -> Step<Applied> {
        let def = self.catalog.table(table)?;
        let name = def.schema.table;
        def.schema.validate_partial(fields)?;
        for (field, _) in fields {
            if def.schema.field(field).is_some_and(|spec| !spec.mutable) {
                return Err(StoreError::Schema(format!(
                    "Field '{field}' of table '{name}' is immutable"
                )));
            }
        }

        let current = match staging.table(name)?.get(id) {
            Some(row) => row.clone(),
            None => {
                return Ok(Err(Rejection::NotFound {
                    table: name.to_string(),
                    id,
                }));
            }
        };
        if current.version != expected {
            return Ok(Err(Rejection::VersionConflict {
                table: name.to_string(),
                id,
                current: current.version,
            }));
        }

        let mut merged = current.fields.clone();
        merged.merge(fields);
        def.schema.validate_complete(&merged)?;

        if let Err(rejection) = check_references(staging, def, fields)? {
            return Ok(Err(rejection));
        }
        if let Err(violation) = staging.table(name)?.check_unique(&def.unique, &merged, Some(id)) {
            return Ok(Err(Rejection::Constraint(violation)));
        }

        let row = StoredRow {
            id,
            version: staging.next_version(),
            fields: merged,
            audit: current.audit.clone(),
        };
        staging.table_mut(name)?.put(row.clone());

        Ok(Ok(Applied {
            audit: def
                .auditable
                .then(|| (name, id, TrackedEntry::modified(current.audit)))
                .into_iter()
                .collect(),
            result: OpResult::Updated(row),
        }))
    }

    fn apply_delete(&self, staging: &mut Staging<'_>, table: &str, id: RecordId) -> Step<Applied> {
        let name = self.catalog.table(table)?.schema.table;
        if !staging.table(name)?.contains(id) {
            return Ok(Err(Rejection::NotFound {
                table: name.to_string(),
                id,
            }));
        }

        let doomed = match self.plan_delete(staging, name, id)? {
            Ok(doomed) => doomed,
            Err(rejection) => return Ok(Err(rejection)),
        };

        let mut cascaded = Vec::new();
        let mut audit = Vec::new();
        for (dependent, dependent_id) in doomed {
            let removed = staging.table_mut(dependent)?.remove(dependent_id);
            if self.catalog.table(dependent)?.auditable {
                let original = removed.and_then(|row| row.audit);
                audit.push((dependent, dependent_id, TrackedEntry::deleted(original)));
            }
            if (dependent, dependent_id) != (name, id) {
                cascaded.push((dependent.to_string(), dependent_id));
            }
        }

        Ok(Ok(Applied {
            result: OpResult::Deleted {
                table: name.to_string(),
                id,
                cascaded,
            },
            audit,
        }))
    }

    /// Every row removed by deleting `table#id`: the row itself plus the
    /// transitive closure over cascading relationships. Rejected when a
    /// restricting relationship still has a dependent outside that closure.
    fn plan_delete(
        &self,
        staging: &Staging<'_>,
        table: &'static str,
        id: RecordId,
    ) -> Step<BTreeSet<(&'static str, RecordId)>> {
        let mut doomed = BTreeSet::from([(table, id)]);
        let mut pending = vec![(table, id)];
        let mut restricted = Vec::new();

        while let Some((parent, parent_id)) = pending.pop() {
            for rel in self.catalog.dependents_of(parent) {
                for dependent_id in staging.table(rel.dependent)?.referencing(rel.field, parent_id) {
                    match rel.on_delete {
                        DeletePolicy::Cascade => {
                            if doomed.insert((rel.dependent, dependent_id)) {
                                pending.push((rel.dependent, dependent_id));
                            }
                        }
                        DeletePolicy::Restrict => restricted.push((rel, dependent_id)),
                    }
                }
            }
        }

        for (rel, dependent_id) in restricted {
            if !doomed.contains(&(rel.dependent, dependent_id)) {
                return Ok(Err(Rejection::RestrictedBy {
                    table: table.to_string(),
                    id,
                    relationship: rel.name.to_string(),
                    dependent_table: rel.dependent.to_string(),
                }));
            }
        }

        Ok(Ok(doomed))
    }
}

/// Every non-null reference in `fields` must point at a live row.
fn check_references(staging: &Staging<'_>, def: &TableDef, fields: &RecordSnapshot) -> Step<()> {
    for (spec, target) in def.schema.references() {
        let Some(target_id) = fields.value(spec.name).as_reference() else {
            continue;
        };
        if !staging.table(target)?.contains(target_id) {
            return Ok(Err(Rejection::Constraint(ConstraintViolation {
                table: def.schema.table.to_string(),
                kind: ConstraintKind::MissingReference {
                    field: spec.name.to_string(),
                    target: target.to_string(),
                    id: target_id,
                },
            })));
        }
    }
    Ok(Ok(()))
}

#[async_trait]
impl Store for MemoryStore {
    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    async fn load(&self, table: &str, id: RecordId) -> StoreResult<Option<StoredRow>> {
        let name = self.catalog.table(table)?.schema.table;
        let db = self.db.read().await;
        Ok(db.tables.get(name).and_then(|t| t.get(id)).cloned())
    }

    async fn scan(&self, table: &str) -> StoreResult<Vec<StoredRow>> {
        let name = self.catalog.table(table)?.schema.table;
        let db = self.db.read().await;
        Ok(db
            .tables
            .get(name)
            .map(|t| t.rows().cloned().collect())
            .unwrap_or_default())
    }

    async fn commit(&self, actor: &ActorContext, batch: WriteBatch) -> StoreResult<CommitOutcome> {
        let mut db = self.db.write().await;
        let mut staging = Staging::new(&db);
        let mut results = Vec::with_capacity(batch.len());
        let mut stamped: Vec<(usize, &'static str, RecordId)> = Vec::new();
        let mut entries = Vec::new();

        for (op_index, op) in batch.ops().iter().enumerate() {
            let step = match op {
                WriteOp::Insert { table, fields } => self.apply_insert(&mut staging, table, fields)?,
                WriteOp::Update {
                    table,
                    id,
                    expected,
                    fields,
                } => self.apply_update(&mut staging, table, *id, *expected, fields)?,
                WriteOp::Delete { table, id } => self.apply_delete(&mut staging, table, *id)?,
            };

            match step {
                Ok(applied) => {
                    for (table, id, entry) in applied.audit {
                        stamped.push((results.len(), table, id));
                        entries.push(entry);
                    }
                    results.push(applied.result);
                }
                Err(rejection) => {
                    debug!(op_index, table = op.table(), ?rejection, "commit rejected");
                    return Ok(CommitOutcome::Rejected {
                        op_index,
                        rejection,
                    });
                }
            }
        }

        if !entries.is_empty() {
            self.stamper.stamp_batch(actor, &mut entries);
            for (&(result_index, table, id), entry) in stamped.iter().zip(&entries) {
                if entry.state == EntryState::Deleted {
                    continue;
                }
                if let Some(row) = staging.table_mut(table)?.get_mut(id) {
                    row.audit = entry.audit.clone();
                }
                if let Some(OpResult::Inserted(row) | OpResult::Updated(row)) =
                    results.get_mut(result_index)
                {
                    row.audit = entry.audit.clone();
                }
            }
        }

        let (touched, last_version) = staging.finish();
        db.tables.extend(touched);
        db.last_version = last_version;

        debug!(
            actor = actor.name(),
            ops = results.len(),
            "commit applied"
        );
        Ok(CommitOutcome::Committed(results))
    }
}
