//! The persistence boundary.
//!
//! A [`Store`] owns rows, version tokens, unique indexes and the
//! restrict/cascade policy of every relationship. Callers hand it a
//! [`WriteBatch`] together with the acting user; the store validates the whole
//! batch, stamps audit data from a single clock read and applies it
//! atomically, or applies nothing.
//!
//! Expected outcomes of a write (stale token, missing row, unique violation,
//! restricted delete) come back as values ([`CommitOutcome::Rejected`]);
//! [`StoreError`] is reserved for infrastructure failures.

pub mod catalog;
pub mod memory;
pub mod retry;
pub mod table;

pub use catalog::{Catalog, CatalogBuilder, DeletePolicy, Relationship, TableDef, UniqueIndex};
pub use memory::MemoryStore;
pub use retry::{RetryPolicy, RetryingStore};

use crate::audit::ActorContext;
use crate::core::{FieldValue, RecordId, RecordSnapshot, StoreResult};
use crate::record::{StoredRow, VersionToken};
use async_trait::async_trait;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Insert {
        table: String,
        fields: RecordSnapshot,
    },
    /// Applies `fields` over the stored row only if its token still equals `expected`.
    Update {
        table: String,
        id: RecordId,
        expected: VersionToken,
        fields: RecordSnapshot,
    },
    Delete {
        table: String,
        id: RecordId,
    },
}

impl WriteOp {
    pub fn table(&self) -> &str {
        match self {
            Self::Insert { table, .. } | Self::Update { table, .. } | Self::Delete { table, .. } => {
                table
            }
        }
    }
}

/// Operations committed together or not at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, table: impl Into<String>, fields: RecordSnapshot) -> Self {
        self.ops.push(WriteOp::Insert {
            table: table.into(),
            fields,
        });
        self
    }

    pub fn update(
        mut self,
        table: impl Into<String>,
        id: RecordId,
        expected: VersionToken,
        fields: RecordSnapshot,
    ) -> Self {
        self.ops.push(WriteOp::Update {
            table: table.into(),
            id,
            expected,
            fields,
        });
        self
    }

    pub fn delete(mut self, table: impl Into<String>, id: RecordId) -> Self {
        self.ops.push(WriteOp::Delete {
            table: table.into(),
            id,
        });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique {
        constraint: String,
        fields: Vec<String>,
    },
    MissingReference {
        field: String,
        target: String,
        id: RecordId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintViolation {
    pub table: String,
    pub kind: ConstraintKind,
}

impl ConstraintViolation {
    /// `Clients.Email`, `GroupClasses.fitness_category_id`, ...
    pub fn constraint_name(&self) -> String {
        match &self.kind {
            ConstraintKind::Unique { constraint, .. } => constraint.clone(),
            ConstraintKind::MissingReference { field, .. } => format!("{}.{}", self.table, field),
        }
    }

    /// The first form field the violation should be reported against.
    pub fn field(&self) -> Option<&str> {
        match &self.kind {
            ConstraintKind::Unique { fields, .. } => fields.first().map(String::as_str),
            ConstraintKind::MissingReference { field, .. } => Some(field),
        }
    }
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConstraintKind::Unique { constraint, .. } => {
                write!(f, "UNIQUE constraint failed: {constraint}")
            }
            ConstraintKind::MissingReference { field, target, id } => write!(
                f,
                "FOREIGN KEY constraint failed: {}.{} references missing {}#{}",
                self.table, field, target, id
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    VersionConflict {
        table: String,
        id: RecordId,
        current: VersionToken,
    },
    NotFound {
        table: String,
        id: RecordId,
    },
    Constraint(ConstraintViolation),
    RestrictedBy {
        table: String,
        id: RecordId,
        relationship: String,
        dependent_table: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpResult {
    Inserted(StoredRow),
    Updated(StoredRow),
    Deleted {
        table: String,
        id: RecordId,
        /// Rows removed through cascading relationships.
        cascaded: Vec<(String, RecordId)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Committed(Vec<OpResult>),
    /// Nothing was applied; `op_index` points at the offending operation.
    Rejected {
        op_index: usize,
        rejection: Rejection,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(StoredRow),
    ConstraintViolation(ConstraintViolation),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied(VersionToken),
    VersionConflict,
    NotFound,
    ConstraintViolation(ConstraintViolation),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    RestrictedBy(String),
    NotFound,
}

/// Row storage with optimistic versioning.
///
/// A [`StoreError::Transient`](crate::core::StoreError::Transient) from
/// `commit` guarantees nothing was applied, so the batch may be retried.
#[async_trait]
pub trait Store: Send + Sync {
    fn catalog(&self) -> &Catalog;

    async fn load(&self, table: &str, id: RecordId) -> StoreResult<Option<StoredRow>>;

    async fn scan(&self, table: &str) -> StoreResult<Vec<StoredRow>>;

    async fn commit(&self, actor: &ActorContext, batch: WriteBatch) -> StoreResult<CommitOutcome>;

    /// First row whose `field` equals `value` exactly, by ascending id.
    async fn find_first(
        &self,
        table: &str,
        field: &str,
        value: &FieldValue,
    ) -> StoreResult<Option<StoredRow>> {
        let rows = self.scan(table).await?;
        Ok(rows
            .into_iter()
            .find(|row| row.fields.value(field).semantic_eq(value)))
    }

    async fn insert(
        &self,
        actor: &ActorContext,
        table: &str,
        fields: RecordSnapshot,
    ) -> StoreResult<InsertOutcome> {
        let outcome = self
            .commit(actor, WriteBatch::new().insert(table, fields))
            .await?;
        match outcome {
            CommitOutcome::Committed(mut results) => match results.pop() {
                Some(OpResult::Inserted(row)) => Ok(InsertOutcome::Inserted(row)),
                other => Err(unexpected("insert", other)),
            },
            CommitOutcome::Rejected {
                rejection: Rejection::Constraint(violation),
                ..
            } => Ok(InsertOutcome::ConstraintViolation(violation)),
            CommitOutcome::Rejected { rejection, .. } => Err(unexpected_rejection("insert", rejection)),
        }
    }

    async fn write(
        &self,
        actor: &ActorContext,
        table: &str,
        id: RecordId,
        fields: RecordSnapshot,
        expected: VersionToken,
    ) -> StoreResult<WriteOutcome> {
        let outcome = self
            .commit(actor, WriteBatch::new().update(table, id, expected, fields))
            .await?;
        match outcome {
            CommitOutcome::Committed(mut results) => match results.pop() {
                Some(OpResult::Updated(row)) => Ok(WriteOutcome::Applied(row.version)),
                other => Err(unexpected("write", other)),
            },
            CommitOutcome::Rejected { rejection, .. } => match rejection {
                Rejection::VersionConflict { .. } => Ok(WriteOutcome::VersionConflict),
                Rejection::NotFound { .. } => Ok(WriteOutcome::NotFound),
                Rejection::Constraint(violation) => Ok(WriteOutcome::ConstraintViolation(violation)),
                other => Err(unexpected_rejection("write", other)),
            },
        }
    }

    async fn delete(
        &self,
        actor: &ActorContext,
        table: &str,
        id: RecordId,
    ) -> StoreResult<DeleteOutcome> {
        let outcome = self.commit(actor, WriteBatch::new().delete(table, id)).await?;
        match outcome {
            CommitOutcome::Committed(_) => Ok(DeleteOutcome::Deleted),
            CommitOutcome::Rejected { rejection, .. } => match rejection {
                Rejection::RestrictedBy { relationship, .. } => {
                    Ok(DeleteOutcome::RestrictedBy(relationship))
                }
                Rejection::NotFound { .. } => Ok(DeleteOutcome::NotFound),
                other => Err(unexpected_rejection("delete", other)),
            },
        }
    }
}

fn unexpected(operation: &str, result: Option<OpResult>) -> crate::core::StoreError {
    crate::core::StoreError::Schema(format!(
        "{operation} committed with unexpected result {result:?}"
    ))
}

fn unexpected_rejection(operation: &str, rejection: Rejection) -> crate::core::StoreError {
    crate::core::StoreError::Schema(format!(
        "{operation} rejected with unexpected reason {rejection:?}"
    ))
}
