//! Bulk load of exercises and their fitness categories from a worksheet.
//!
//! Rows are committed one at a time. A rejected row never undoes the rows
//! before it, and a store failure part way through keeps what was written.

use crate::audit::ActorContext;
use crate::core::{EntitySchema, FieldValue, GymError, GymResult, RecordId, RecordSnapshot, StoreError};
use crate::domain::{EXERCISE_CATEGORIES, EXERCISES, ExerciseCategory, FITNESS_CATEGORIES};
use crate::spreadsheet::Worksheet;
use crate::store::{InsertOutcome, Store};
use serde::Serialize;
use tracing::{debug, info};

pub const HEADER_EXERCISE: &str = "Exercise";
pub const HEADER_CATEGORY: &str = "FitnessCategory";

const NO_FILE: &str = "Error: No file uploaded.";
const EMPTY_FILE: &str = "Error: file appears to be empty.";
const NOT_A_SPREADSHEET: &str = "Error: That file is not an Excel spreadsheet.";
const WRONG_HEADER: &str = "Error: You may have selected the wrong file to upload. Remember, you must have the heading 'Exercise' in the first cell of the first row and 'FitnessCategory' in the second cell of the first row.";

/// An uploaded file as received from the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Upload {
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(content_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: None,
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Reads the upload as a worksheet. Excel content types are opened as a
    /// workbook, or as CSV text when the browser labelled a `.csv` file that way.
    pub fn worksheet(&self) -> GymResult<Worksheet> {
        let content_type = self.content_type.to_ascii_lowercase();
        if content_type.is_empty() && self.bytes.is_empty() {
            return Err(GymError::validation(None, NO_FILE));
        }
        if self.bytes.is_empty() {
            return Err(GymError::validation(None, EMPTY_FILE));
        }

        let parsed = if content_type.contains("excel") || content_type.contains("spreadsheet") {
            if Worksheet::looks_like_workbook(&self.bytes) {
                Worksheet::from_workbook(&self.bytes)
            } else {
                Worksheet::from_csv_bytes(&self.bytes)
            }
        } else if content_type.contains("csv") {
            Worksheet::from_csv_bytes(&self.bytes)
        } else if content_type.contains("json") {
            Worksheet::from_json(&self.bytes)
        } else {
            return Err(GymError::validation(None, NOT_A_SPREADSHEET));
        };
        parsed.map_err(|e| GymError::validation(None, format!("Error: {e}")))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub success_count: usize,
    pub error_count: usize,
    /// One line per rejected row, in row order.
    pub feedback: Vec<String>,
}

impl ImportSummary {
    pub fn total(&self) -> usize {
        self.success_count + self.error_count
    }

    pub fn message(&self) -> String {
        format!(
            "Finished Importing {} Records with {} inserted and {} rejected.",
            self.total(),
            self.success_count,
            self.error_count
        )
    }
}

enum RowError {
    Rejected(String),
    Abort(GymError),
}

impl From<StoreError> for RowError {
    fn from(err: StoreError) -> Self {
        Self::Abort(err.into())
    }
}

/// Checks the header row, then links every data row's exercise to its category.
pub async fn import_exercises(
    store: &dyn Store,
    actor: &ActorContext,
    upload: &Upload,
) -> GymResult<ImportSummary> {
    let sheet = upload.worksheet()?;
    if sheet.row_count() == 0 {
        return Err(GymError::validation(None, EMPTY_FILE));
    }
    if sheet.text(1, 1).trim() != HEADER_EXERCISE || sheet.text(1, 2).trim() != HEADER_CATEGORY {
        return Err(GymError::validation(None, WRONG_HEADER));
    }

    let mut summary = ImportSummary::default();
    for row in 2..=sheet.row_count() {
        let exercise = sheet.text(row, 1).trim().to_string();
        let category = sheet.text(row, 2).trim().to_string();

        match import_row(store, actor, row, &exercise, &category).await {
            Ok(()) => summary.success_count += 1,
            Err(RowError::Rejected(message)) => {
                debug!(row, exercise = %exercise, category = %category, "import row rejected");
                summary.error_count += 1;
                summary.feedback.push(message);
            }
            Err(RowError::Abort(err)) => return Err(err),
        }
    }

    info!(
        actor = actor.name(),
        inserted = summary.success_count,
        rejected = summary.error_count,
        "exercise import finished"
    );
    Ok(summary)
}

async fn import_row(
    store: &dyn Store,
    actor: &ActorContext,
    row: usize,
    exercise: &str,
    category: &str,
) -> Result<(), RowError> {
    if exercise.is_empty() || category.is_empty() {
        let err = GymError::MalformedImportRow {
            row,
            reason: format!("both '{HEADER_EXERCISE}' and '{HEADER_CATEGORY}' need a value"),
        };
        return Err(RowError::Rejected(err.to_string()));
    }

    let exercise_id = find_or_create(store, actor, &EXERCISES, "name", exercise).await?;
    let category_id = find_or_create(store, actor, &FITNESS_CATEGORIES, "category", category).await?;

    let link = ExerciseCategory::snapshot(category_id, exercise_id);
    match store.insert(actor, EXERCISE_CATEGORIES.table, link).await? {
        InsertOutcome::Inserted(_) => Ok(()),
        InsertOutcome::ConstraintViolation(_) => Err(RowError::Rejected(format!(
            "Error: Record {exercise} ({category}) was rejected as a duplicate."
        ))),
    }
}

/// Id of the row whose `field` is exactly `value`, inserting one if needed.
async fn find_or_create(
    store: &dyn Store,
    actor: &ActorContext,
    schema: &EntitySchema,
    field: &str,
    value: &str,
) -> Result<RecordId, RowError> {
    let wanted = FieldValue::from(value);
    if let Some(existing) = store.find_first(schema.table, field, &wanted).await? {
        return Ok(existing.id);
    }

    let fields = RecordSnapshot::new().with(field, wanted.clone());
    match store.insert(actor, schema.table, fields).await? {
        InsertOutcome::Inserted(row) => {
            debug!(table = schema.table, id = row.id, "created during import");
            Ok(row.id)
        }
        // Written by someone else between the lookup and the insert.
        InsertOutcome::ConstraintViolation(violation) => store
            .find_first(schema.table, field, &wanted)
            .await?
            .map(|row| row.id)
            .ok_or_else(|| RowError::Rejected(format!("Error: {violation}"))),
    }
}
