pub mod error;
pub mod format;
pub mod types;
pub mod value;

pub use error::{
    FieldError, GymError, GymResult, StoreError, StoreResult, ValidationErrors,
};
pub use types::{DisplayFormat, EntitySchema, FieldKind, FieldSpec, RecordSnapshot};
pub use value::{FieldValue, RecordId};
