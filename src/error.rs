use thiserror::Error;

use crate::tree::RowId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookoutError {
    #[error("Malformed row id: {0:?}")]
    MalformedRowId(String),

    #[error("Could not find row to merge with path {}", format_path(.0))]
    MergeTargetNotFound(Vec<RowId>),

    /// Returned by query services when a request could not be answered.
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Row not found: {0}")]
    RowNotFound(RowId),

    #[error("Row is not a group: {0}")]
    NotAGroup(RowId),

    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("Invalid grouping: {0}")]
    InvalidGrouping(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),
}

fn format_path(path: &[RowId]) -> String {
    let parts: Vec<&str> = path.iter().map(RowId::as_str).collect();
    format!("[{}]", parts.join(", "))
}

pub type Result<T> = std::result::Result<T, LookoutError>;
