use super::import::{self, ImportSummary, Upload};
use super::{load_all, load_record};
use crate::audit::{ActorContext, Role};
use crate::core::{GymError, GymResult, RecordId, RecordSnapshot};
use crate::domain::{Exercise, ExerciseCategory, FITNESS_CATEGORIES, FitnessCategory};
use crate::reconcile::{ConflictReconciler, EditRequest, constraint_error};
use crate::record::VersionToken;
use crate::record::VersionedRecord;
use crate::store::{DeleteOutcome, InsertOutcome, Store};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

pub const FITNESS_CATEGORY_EDITABLE_FIELDS: &[&str] = &["category"];

const STAFF_ROLES: &[Role] = &[Role::Admin, Role::Supervisor, Role::Staff];
const CATEGORY_MAX_LEN: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FitnessCategoryForm {
    pub category: Option<String>,
}

impl FitnessCategoryForm {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
        }
    }

    pub fn validate(&self) -> GymResult<RecordSnapshot> {
        let category = self.category.as_deref().map(str::trim).unwrap_or_default();
        if category.is_empty() {
            return Err(GymError::validation(
                Some("category"),
                "You cannot leave the name of the Category blank.",
            ));
        }
        if category.chars().count() > CATEGORY_MAX_LEN {
            return Err(GymError::validation(
                Some("category"),
                format!("Category cannot be more than {CATEGORY_MAX_LEN} characters long."),
            ));
        }
        Ok(RecordSnapshot::new().with("category", category))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryListItem {
    pub id: RecordId,
    pub row_version: VersionToken,
    pub category: String,
    pub exercise_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryDetails {
    #[serde(flatten)]
    pub category: FitnessCategory,
    /// Linked exercises, by name.
    pub exercises: Vec<Exercise>,
}

fn unique_category_error(err: GymError, verb: &str) -> GymError {
    match err {
        GymError::ConstraintViolation { constraint, .. } if constraint == "FitnessCategories.Category" => {
            GymError::ConstraintViolation {
                constraint,
                field: Some("category".to_string()),
                message: format!(
                    "Unable to {verb} the record. The Fitness Category is already in our records, it must be unique."
                ),
            }
        }
        other => other,
    }
}

pub struct FitnessCategoryService {
    store: Arc<dyn Store>,
    reconciler: ConflictReconciler,
}

impl FitnessCategoryService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            reconciler: ConflictReconciler::new(store.clone()),
            store,
        }
    }

    pub async fn index(&self, actor: &ActorContext) -> GymResult<Vec<CategoryListItem>> {
        actor.require_authenticated()?;

        let links: Vec<ExerciseCategory> = load_all(self.store.as_ref()).await?;
        let mut counts: HashMap<RecordId, usize> = HashMap::new();
        for link in &links {
            *counts.entry(link.fitness_category_id).or_default() += 1;
        }

        let mut items: Vec<CategoryListItem> = load_all::<FitnessCategory>(self.store.as_ref())
            .await?
            .into_iter()
            .map(|c| CategoryListItem {
                exercise_count: counts.get(&c.id).copied().unwrap_or(0),
                id: c.id,
                row_version: c.row_version,
                category: c.category,
            })
            .collect();
        items.sort_by(|a, b| a.category.cmp(&b.category));
        Ok(items)
    }

    pub async fn details(&self, actor: &ActorContext, id: RecordId) -> GymResult<CategoryDetails> {
        actor.require_any_role(STAFF_ROLES)?;
        let category: FitnessCategory = load_record(self.store.as_ref(), id).await?;

        let linked: HashSet<RecordId> = load_all::<ExerciseCategory>(self.store.as_ref())
            .await?
            .into_iter()
            .filter(|link| link.fitness_category_id == id)
            .map(|link| link.exercise_id)
            .collect();
        let mut exercises: Vec<Exercise> = load_all::<Exercise>(self.store.as_ref())
            .await?
            .into_iter()
            .filter(|e| linked.contains(&e.id))
            .collect();
        exercises.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(CategoryDetails { category, exercises })
    }

    pub async fn create(&self, actor: &ActorContext, form: FitnessCategoryForm) -> GymResult<FitnessCategory> {
        actor.require_any_role(STAFF_ROLES)?;
        let fields = form.validate()?;

        match self.store.insert(actor, FITNESS_CATEGORIES.table, fields).await? {
            InsertOutcome::Inserted(row) => {
                info!(id = row.id, actor = actor.name(), "fitness category created");
                FitnessCategory::from_row(&row)
            }
            InsertOutcome::ConstraintViolation(violation) => {
                Err(unique_category_error(constraint_error(&violation), "create"))
            }
        }
    }

    pub async fn edit(
        &self,
        actor: &ActorContext,
        id: RecordId,
        form: FitnessCategoryForm,
        starting_token: VersionToken,
    ) -> GymResult<FitnessCategory> {
        actor.require_any_role(STAFF_ROLES)?;
        load_record::<FitnessCategory>(self.store.as_ref(), id).await?;
        let submitted = form.validate()?;

        let outcome = self
            .reconciler
            .reconcile(
                actor,
                EditRequest {
                    schema: &FITNESS_CATEGORIES,
                    id,
                    submitted,
                    starting_token,
                    allowed: FITNESS_CATEGORY_EDITABLE_FIELDS,
                },
            )
            .await
            .map_err(|err| unique_category_error(err, "update"))?;

        outcome.into_result(&FITNESS_CATEGORIES, id)?;
        load_record(self.store.as_ref(), id).await
    }

    /// Links to exercises go with the category; group classes block it.
    pub async fn delete(&self, actor: &ActorContext, id: RecordId) -> GymResult<()> {
        actor.require_any_role(&[Role::Admin])?;

        match self.store.delete(actor, FITNESS_CATEGORIES.table, id).await? {
            DeleteOutcome::Deleted => {
                info!(id, actor = actor.name(), "fitness category deleted");
                Ok(())
            }
            DeleteOutcome::RestrictedBy(relationship) => Err(GymError::RestrictedDelete {
                relationship,
                message: "Unable to Delete Fitness Category. Remember, you cannot delete a Category if there are Group Classes in it.".to_string(),
            }),
            DeleteOutcome::NotFound => Err(GymError::not_found(FITNESS_CATEGORIES.entity, id)),
        }
    }

    pub async fn import_exercises(&self, actor: &ActorContext, upload: &Upload) -> GymResult<ImportSummary> {
        actor.require_any_role(&[Role::Admin])?;
        import::import_exercises(self.store.as_ref(), actor, upload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_trims_and_limits_the_name() {
        let snapshot = FitnessCategoryForm::new("  Cardio ").validate().unwrap();
        assert_eq!(snapshot.text("category").unwrap(), "Cardio");

        assert!(FitnessCategoryForm::default().validate().is_err());
        assert!(FitnessCategoryForm::new("x".repeat(51)).validate().is_err());
    }

    #[test]
    fn duplicate_names_get_the_unique_message() {
        let err = unique_category_error(
            GymError::ConstraintViolation {
                constraint: "FitnessCategories.Category".to_string(),
                field: Some("category".to_string()),
                message: "UNIQUE constraint failed: FitnessCategories.Category".to_string(),
            },
            "update",
        );
        assert_eq!(
            err.to_string(),
            "Unable to update the record. The Fitness Category is already in our records, it must be unique."
        );
    }
}
