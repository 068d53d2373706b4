//! Load orchestration for the jobs table.
//!
//! - [`state`]: the user-controlled inputs and the pure per-pass decision
//! - [`orchestrator`]: [`JobsTable`], which owns the forest and runs passes
//! - [`selection`]: selected row tracking
//!
//! # Pass flow
//!
//! 1. An intent changes [`TableState`]; root-level changes (grouping,
//!    filters, sort, pagination) also cancel in-flight requests
//! 2. [`JobsTable::begin_pass`] diffs the state against the last synced
//!    snapshot and returns at most one [`PendingFetch`]
//! 3. [`PendingFetch::run`] awaits the query service
//! 4. [`JobsTable::complete`] drops the result if the state moved on,
//!    otherwise merges it and updates counts and selection

pub mod orchestrator;
pub mod selection;
pub mod state;

pub use orchestrator::{CompletedFetch, FetchedPage, JobsTable, PassOutcome, PassStart, PendingFetch};
pub use selection::Selection;
pub use state::{Decision, FetchKind, FetchPlan, LoadMoreRequest, Pagination, TableState};
