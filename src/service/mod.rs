//! Request-level operations: authorization, validation, paging, and the
//! translation of store outcomes into user-facing errors.

pub mod client;
pub mod fitness_category;
pub mod import;
pub mod notify;
pub mod report;

pub use client::{CLIENT_EDITABLE_FIELDS, ClientForm, ClientService, EmailRequest};
pub use fitness_category::{
    CategoryDetails, CategoryListItem, FITNESS_CATEGORY_EDITABLE_FIELDS, FitnessCategoryForm,
    FitnessCategoryService,
};
pub use import::{ImportSummary, Upload};
pub use notify::{
    EmailAddress, EmailMessage, EmailSender, HttpEmailSender, LogEmailSender, NotificationError,
};
pub use report::MembershipTypeSummary;

use crate::core::{GymError, GymResult, RecordId};
use crate::record::VersionedRecord;
use crate::store::Store;
use serde::{Deserialize, Serialize};

/// Page sizes offered to users. Anything else is snapped to the next one up.
pub const PAGE_SIZES: [usize; 9] = [3, 5, 10, 20, 30, 40, 50, 100, 500];

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Smallest offered size that holds `requested` rows; the largest one past that.
pub fn snap_page_size(requested: usize) -> usize {
    PAGE_SIZES
        .iter()
        .copied()
        .find(|size| *size >= requested)
        .unwrap_or(PAGE_SIZES[PAGE_SIZES.len() - 1])
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl PageRequest {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self {
            page: Some(page),
            page_size: Some(page_size),
        }
    }

    /// Page number (1-based) and snapped page size.
    pub fn resolve(&self, default_size: usize) -> (usize, usize) {
        let size = snap_page_size(self.page_size.unwrap_or(default_size).max(1));
        (self.page.unwrap_or(1).max(1), size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    /// Slices `items`; a page past the end is clamped to the last page.
    pub fn paginate(items: Vec<T>, request: PageRequest, default_size: usize) -> Self {
        let (page, page_size) = request.resolve(default_size);
        let total = items.len();
        let total_pages = total.div_ceil(page_size);
        let page = page.min(total_pages.max(1));
        let items = items
            .into_iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .collect();
        Self {
            items,
            page,
            page_size,
            total,
            total_pages,
        }
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

pub(crate) async fn load_record<T: VersionedRecord>(store: &dyn Store, id: RecordId) -> GymResult<T> {
    match store.load(T::SCHEMA.table, id).await? {
        Some(row) => T::from_row(&row),
        None => Err(GymError::not_found(T::SCHEMA.entity, id)),
    }
}

pub(crate) async fn load_all<T: VersionedRecord>(store: &dyn Store) -> GymResult<Vec<T>> {
    store
        .scan(T::SCHEMA.table)
        .await?
        .iter()
        .map(T::from_row)
        .collect()
}

/// The generic message for a failure the user cannot fix by editing the form.
pub const UNABLE_TO_SAVE: &str =
    "Unable to save changes. Try again, and if the problem persists see your system administrator.";
