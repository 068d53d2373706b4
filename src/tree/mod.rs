//! The lazily-materialized jobs tree.
//!
//! - [`row_id`]: path-encoded row identifiers
//! - [`row`]: job and group rows
//! - [`merge`]: copy-on-write merging of fetched pages
//! - [`flatten`]: display-order walk over expanded rows

pub mod flatten;
pub mod merge;
pub mod row;
pub mod row_id;

pub use flatten::{visible_rows, VisibleRow};
pub use merge::{merge_sub_rows, set_sub_row_count, Merged};
pub use row::{find_row, groups_to_rows, jobs_to_rows, Forest, GroupRow, JobRow, Row};
pub use row_id::{RowId, RowIdInfo, RowIdPart};
