//! Merging fetched pages into an existing forest.
//!
//! Every merge is copy-on-write: the rows on the path from the root to the
//! target group are cloned, everything else is shared with the previous
//! forest through its `Arc`. The returned forest is always a new vector, so
//! consumers can detect changes by identity and keep reading old snapshots.

use std::sync::Arc;

use crate::error::{LookoutError, Result};
use crate::tree::row::{Forest, GroupRow, Row};
use crate::tree::row_id::RowId;

#[derive(Debug, Clone)]
pub struct Merged {
    pub forest: Forest,
    /// The group the rows were merged under, after the merge.
    pub parent: Option<Arc<Row>>,
}

/// Merge `new_rows` under the group at the end of `location`.
///
/// `location` is the target's `path_from_root`. An empty location makes
/// `new_rows` the whole forest. With `append` the rows are added after the
/// group's existing children, otherwise they replace them.
pub fn merge_sub_rows(
    forest: &[Arc<Row>],
    new_rows: Vec<Arc<Row>>,
    location: &[RowId],
    append: bool,
) -> Result<Merged> {
    if location.is_empty() {
        return Ok(Merged {
            forest: new_rows,
            parent: None,
        });
    }

    let (forest, parent) = rewrite_group(forest, location, move |group| {
        let sub_rows = match (append, group.sub_rows.take()) {
            (true, Some(mut existing)) => {
                existing.extend(new_rows);
                existing
            }
            _ => new_rows,
        };
        group.sub_rows = Some(sub_rows);
    })?;

    Ok(Merged {
        forest,
        parent: Some(parent),
    })
}

/// Record the total number of direct children of the group at `location`.
pub fn set_sub_row_count(
    forest: &[Arc<Row>],
    location: &[RowId],
    count: usize,
) -> Result<(Forest, Arc<Row>)> {
    rewrite_group(forest, location, |group| group.sub_row_count = Some(count))
}

fn rewrite_group<F>(forest: &[Arc<Row>], location: &[RowId], edit: F) -> Result<(Forest, Arc<Row>)>
where
    F: FnOnce(&mut GroupRow),
{
    walk(forest, location, edit)
        .ok_or_else(|| LookoutError::MergeTargetNotFound(location.to_vec()))
}

fn walk<F>(level: &[Arc<Row>], remaining: &[RowId], edit: F) -> Option<(Forest, Arc<Row>)>
where
    F: FnOnce(&mut GroupRow),
{
    let (head, rest) = remaining.split_first()?;
    // Linear scan; sibling counts are bounded by the page size.
    let index = level.iter().position(|row| row.row_id() == head)?;
    let Row::Group(group) = level[index].as_ref() else {
        return None;
    };
    let mut group = group.clone();

    let target = if rest.is_empty() {
        edit(&mut group);
        None
    } else {
        let children = group.sub_rows.as_deref()?;
        let (children, target) = walk(children, rest, edit)?;
        group.sub_rows = Some(children);
        Some(target)
    };

    let node = Arc::new(Row::Group(group));
    let mut rewritten = level.to_vec();
    rewritten[index] = Arc::clone(&node);
    Some((rewritten, target.unwrap_or(node)))
}
