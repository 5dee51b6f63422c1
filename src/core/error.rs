use crate::reconcile::ConflictReport;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failures raised by a [`Store`](crate::store::Store) implementation itself,
/// as opposed to the expected outcomes of a write (conflict, constraint, restrict).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Table '{0}' not found")]
    UnknownTable(String),

    #[error("Schema violation: {0}")]
    Schema(String),

    #[error("Transient store failure: {0}")]
    Transient(String),

    #[error("Store still failing after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One validation message, optionally bound to a form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: Option<String>,
    pub message: String,
}

/// Accumulated validation messages for a submitted form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: Option<&str>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: Option<&str>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.map(str::to_string),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn for_field(&self, field: &str) -> impl Iterator<Item = &FieldError> {
        self.errors
            .iter()
            .filter(move |error| error.field.as_deref() == Some(field))
    }

    /// `Ok(())` when nothing was recorded, otherwise a [`GymError::Validation`].
    pub fn into_result(self) -> GymResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(GymError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in &self.errors {
            if !first {
                f.write_str("|")?;
            }
            first = false;
            match &error.field {
                Some(field) => write!(f, "{field}: {}", error.message)?,
                None => f.write_str(&error.message)?,
            }
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum GymError {
    #[error("{0}")]
    VersionConflict(ConflictReport),

    #[error("{message}")]
    ConstraintViolation {
        constraint: String,
        field: Option<String>,
        message: String,
    },

    #[error("{message}")]
    RestrictedDelete {
        relationship: String,
        message: String,
    },

    #[error(
        "Unable to save changes after {attempts} attempt(s). Try again, and if the problem persists, see your system administrator."
    )]
    TransientStoreFailure { attempts: u32 },

    #[error("Row {row}: {reason}")]
    MalformedImportRow { row: usize, reason: String },

    #[error("Error: Could not send email message to the {recipients} Client{}.", plural_suffix(.recipients))]
    NotificationDispatchFailure { recipients: usize },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error(transparent)]
    Store(StoreError),
}

pub type GymResult<T> = std::result::Result<T, GymError>;

pub(crate) fn plural_suffix(count: &usize) -> &'static str {
    if *count == 1 { "" } else { "s" }
}

impl GymError {
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(field: Option<&str>, message: impl Into<String>) -> Self {
        Self::Validation(ValidationErrors::single(field, message))
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Whether the failure is resolved by re-displaying the request to the user.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Schema(_) | Self::Store(_))
    }
}

impl From<StoreError> for GymError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Transient(_) => Self::TransientStoreFailure { attempts: 1 },
            StoreError::RetriesExhausted { attempts, .. } => {
                Self::TransientStoreFailure { attempts }
            }
            other => Self::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_retries_become_transient_failures() {
        let err = GymError::from(StoreError::RetriesExhausted {
            attempts: 3,
            last: "connection reset".to_string(),
        });
        assert!(matches!(err, GymError::TransientStoreFailure { attempts: 3 }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn unknown_table_is_not_recoverable() {
        let err = GymError::from(StoreError::UnknownTable("Gyms".to_string()));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn notification_failure_message_pluralises() {
        let one = GymError::NotificationDispatchFailure { recipients: 1 };
        let many = GymError::NotificationDispatchFailure { recipients: 4 };
        assert!(one.to_string().ends_with("1 Client."));
        assert!(many.to_string().ends_with("4 Clients."));
    }

    #[test]
    fn validation_errors_join_with_pipe() {
        let mut errors = ValidationErrors::new();
        errors.push(Some("Email"), "is required");
        errors.push(None, "Unable to save changes.");
        assert_eq!(errors.to_string(), "Email: is required|Unable to save changes.");
        assert_eq!(errors.for_field("Email").count(), 1);
        assert!(errors.into_result().is_err());
    }
}
