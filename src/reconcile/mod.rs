//! Optimistic-concurrency edits with a field-level diff on conflict.
//!
//! The reconciler is table-driven: everything it knows about an entity comes
//! from its [`EntitySchema`], so there is no per-entity conflict code.

use crate::audit::ActorContext;
use crate::core::{
    EntitySchema, FieldKind, FieldValue, GymError, GymResult, RecordId, RecordSnapshot,
};
use crate::record::VersionToken;
use crate::store::{ConstraintViolation, Store, WriteOutcome};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Label shown for a reference whose current target no longer exists.
pub const MISSING_REFERENCE_LABEL: &str = "(none)";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldConflict {
    pub field: String,
    pub submitted: FieldValue,
    pub current: FieldValue,
    /// The live value as a user should read it ("$45.50", "(905) 555-0101", a
    /// referenced record's summary).
    pub current_display: String,
}

impl FieldConflict {
    pub fn message(&self) -> String {
        format!("Current value: {}", self.current_display)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictReport {
    pub entity: String,
    pub id: RecordId,
    pub record_deleted: bool,
    pub fields: Vec<FieldConflict>,
    /// Token of the live row, to resubmit against. `None` once deleted.
    pub current_token: Option<VersionToken>,
}

impl ConflictReport {
    pub fn deleted(entity: impl Into<String>, id: RecordId) -> Self {
        Self {
            entity: entity.into(),
            id,
            record_deleted: true,
            fields: Vec::new(),
            current_token: None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldConflict> {
        self.fields.iter().find(|conflict| conflict.field == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|conflict| conflict.field.as_str()).collect()
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.record_deleted {
            return write!(
                f,
                "Unable to save changes. The {} was deleted by another user.",
                self.entity
            );
        }
        write!(
            f,
            "The record you attempted to edit was modified by another user after you \
             received your values. The edit operation was canceled and the current values \
             in the database have been displayed. If you still want to save your version of \
             this record, submit it again. Otherwise go back to the {} List.",
            self.entity
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Applied(VersionToken),
    /// The row is gone. There is nothing to retry against.
    ConflictDeleted,
    ConflictModified(ConflictReport),
}

impl ReconcileOutcome {
    /// Collapses the two conflict outcomes into a [`GymError::VersionConflict`].
    pub fn into_result(self, schema: &EntitySchema, id: RecordId) -> GymResult<VersionToken> {
        match self {
            Self::Applied(token) => Ok(token),
            Self::ConflictDeleted => Err(GymError::VersionConflict(ConflictReport::deleted(
                schema.entity,
                id,
            ))),
            Self::ConflictModified(report) => Err(GymError::VersionConflict(report)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EditRequest {
    pub schema: &'static EntitySchema,
    pub id: RecordId,
    pub submitted: RecordSnapshot,
    pub starting_token: VersionToken,
    /// Fields the caller is allowed to change. Everything else in `submitted`
    /// is dropped before the write.
    pub allowed: &'static [&'static str],
}

pub struct ConflictReconciler {
    store: Arc<dyn Store>,
}

impl ConflictReconciler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn reconcile(
        &self,
        actor: &ActorContext,
        request: EditRequest,
    ) -> GymResult<ReconcileOutcome> {
        let EditRequest {
            schema,
            id,
            mut submitted,
            starting_token,
            allowed,
        } = request;

        for name in allowed {
            match schema.field(name) {
                Some(spec) if spec.mutable => {}
                Some(_) => {
                    return Err(GymError::Schema(format!(
                        "'{}.{}' is immutable and cannot be edited",
                        schema.table, name
                    )));
                }
                None => {
                    return Err(GymError::Schema(format!(
                        "'{}' has no field '{}'",
                        schema.table, name
                    )));
                }
            }
        }
        submitted.retain_fields(allowed);

        let outcome = self
            .store
            .write(actor, schema.table, id, submitted.clone(), starting_token)
            .await?;

        match outcome {
            WriteOutcome::Applied(token) => {
                debug!(table = schema.table, id, actor = actor.name(), "edit applied");
                Ok(ReconcileOutcome::Applied(token))
            }
            WriteOutcome::NotFound => {
                info!(table = schema.table, id, "edit target was deleted concurrently");
                Ok(ReconcileOutcome::ConflictDeleted)
            }
            WriteOutcome::ConstraintViolation(violation) => Err(constraint_error(&violation)),
            WriteOutcome::VersionConflict => {
                let Some(live) = self.store.load(schema.table, id).await? else {
                    info!(table = schema.table, id, "edit target was deleted concurrently");
                    return Ok(ReconcileOutcome::ConflictDeleted);
                };

                let mut fields = Vec::new();
                for (name, submitted_value) in &submitted {
                    let current = live.fields.value(name);
                    if submitted_value.semantic_eq(current) {
                        continue;
                    }
                    fields.push(FieldConflict {
                        field: name.clone(),
                        submitted: submitted_value.clone(),
                        current: current.clone(),
                        current_display: self.display(schema, name, current).await?,
                    });
                }

                info!(
                    table = schema.table,
                    id,
                    conflicts = fields.len(),
                    "edit rejected, row modified concurrently"
                );
                Ok(ReconcileOutcome::ConflictModified(ConflictReport {
                    entity: schema.entity.to_string(),
                    id,
                    record_deleted: false,
                    fields,
                    current_token: Some(live.version),
                }))
            }
        }
    }

    async fn display(
        &self,
        schema: &EntitySchema,
        name: &str,
        current: &FieldValue,
    ) -> GymResult<String> {
        let Some(spec) = schema.field(name) else {
            return Ok(current.to_string());
        };
        let FieldKind::Reference(target) = spec.kind else {
            return Ok(spec.display.render(current));
        };
        let Some(target_id) = current.as_reference() else {
            return Ok(MISSING_REFERENCE_LABEL.to_string());
        };

        let target_schema = self.store.catalog().schema(target)?;
        Ok(match self.store.load(target, target_id).await? {
            Some(row) => target_schema.summarize(&row.fields),
            None => MISSING_REFERENCE_LABEL.to_string(),
        })
    }
}

/// A non-versioning write failure, reported against the offending field.
pub fn constraint_error(violation: &ConstraintViolation) -> GymError {
    GymError::ConstraintViolation {
        constraint: violation.constraint_name(),
        field: violation.field().map(str::to_string),
        message: violation.to_string(),
    }
}
