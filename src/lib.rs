//! Gym administration back office.
//!
//! Clients, fitness categories and the rest of the gym's records live in a
//! versioned, audited [`store`]. Edits go through the [`reconcile`] layer so
//! that a stale form is reported field by field instead of overwriting
//! someone else's change. The [`service`] layer adds roles, validation and
//! paging, and [`web`] exposes it over HTTP.

pub mod audit;
pub mod config;
pub mod core;
pub mod domain;
pub mod reconcile;
pub mod record;
pub mod seed;
pub mod service;
pub mod spreadsheet;
pub mod store;
pub mod web;

pub use crate::audit::{ActorContext, Role};
pub use crate::core::{GymError, GymResult, StoreError};
pub use crate::domain::gym_catalog;
pub use crate::record::VersionToken;
pub use crate::store::{MemoryStore, RetryPolicy, RetryingStore, Store};
pub use crate::web::{AppState, build_router};
