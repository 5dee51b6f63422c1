use crate::core::{EntitySchema, FieldKind, FieldSpec, FieldValue, GymResult, RecordId, RecordSnapshot};
use crate::record::{AuditStamp, StoredRow, VersionToken, VersionedRecord};
use serde::Serialize;

fn category_summary(snapshot: &RecordSnapshot) -> String {
    snapshot.value("category").to_string()
}

fn exercise_summary(snapshot: &RecordSnapshot) -> String {
    snapshot.value("name").to_string()
}

fn link_summary(snapshot: &RecordSnapshot) -> String {
    format!(
        "Exercise {} in category {}",
        snapshot.value("exercise_id"),
        snapshot.value("fitness_category_id")
    )
}

pub static FITNESS_CATEGORIES: EntitySchema = EntitySchema {
    table: "FitnessCategories",
    entity: "Fitness Category",
    fields: &[FieldSpec::new("category", FieldKind::Text)],
    summary: category_summary,
};

pub static EXERCISES: EntitySchema = EntitySchema {
    table: "Exercises",
    entity: "Exercise",
    fields: &[FieldSpec::new("name", FieldKind::Text)],
    summary: exercise_summary,
};

/// Join rows linking exercises to categories. Both ends are fixed once linked.
pub static EXERCISE_CATEGORIES: EntitySchema = EntitySchema {
    table: "ExerciseCategories",
    entity: "Exercise Category",
    fields: &[
        FieldSpec::new("fitness_category_id", FieldKind::Reference("FitnessCategories")).immutable(),
        FieldSpec::new("exercise_id", FieldKind::Reference("Exercises")).immutable(),
    ],
    summary: link_summary,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitnessCategory {
    pub id: RecordId,
    pub row_version: VersionToken,
    pub category: String,
    pub audit: Option<AuditStamp>,
}

impl VersionedRecord for FitnessCategory {
    const SCHEMA: &'static EntitySchema = &FITNESS_CATEGORIES;

    fn from_row(row: &StoredRow) -> GymResult<Self> {
        Ok(Self {
            id: row.id,
            row_version: row.version,
            category: row.fields.text("category")?,
            audit: row.audit.clone(),
        })
    }

    fn to_snapshot(&self) -> RecordSnapshot {
        RecordSnapshot::new().with("category", self.category.as_str())
    }

    fn id(&self) -> RecordId {
        self.id
    }

    fn version(&self) -> VersionToken {
        self.row_version
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exercise {
    pub id: RecordId,
    pub row_version: VersionToken,
    pub name: String,
}

impl VersionedRecord for Exercise {
    const SCHEMA: &'static EntitySchema = &EXERCISES;

    fn from_row(row: &StoredRow) -> GymResult<Self> {
        Ok(Self {
            id: row.id,
            row_version: row.version,
            name: row.fields.text("name")?,
        })
    }

    fn to_snapshot(&self) -> RecordSnapshot {
        RecordSnapshot::new().with("name", self.name.as_str())
    }

    fn id(&self) -> RecordId {
        self.id
    }

    fn version(&self) -> VersionToken {
        self.row_version
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExerciseCategory {
    pub id: RecordId,
    pub row_version: VersionToken,
    pub fitness_category_id: RecordId,
    pub exercise_id: RecordId,
}

impl ExerciseCategory {
    pub fn snapshot(fitness_category_id: RecordId, exercise_id: RecordId) -> RecordSnapshot {
        RecordSnapshot::new()
            .with("fitness_category_id", FieldValue::Reference(fitness_category_id))
            .with("exercise_id", FieldValue::Reference(exercise_id))
    }
}

impl VersionedRecord for ExerciseCategory {
    const SCHEMA: &'static EntitySchema = &EXERCISE_CATEGORIES;

    fn from_row(row: &StoredRow) -> GymResult<Self> {
        Ok(Self {
            id: row.id,
            row_version: row.version,
            fitness_category_id: row.fields.reference("fitness_category_id")?,
            exercise_id: row.fields.reference("exercise_id")?,
        })
    }

    fn to_snapshot(&self) -> RecordSnapshot {
        Self::snapshot(self.fitness_category_id, self.exercise_id)
    }

    fn id(&self) -> RecordId {
        self.id
    }

    fn version(&self) -> VersionToken {
        self.row_version
    }
}
