use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::tree::row::Row;
use crate::tree::row_id::RowId;

/// One line of the rendered tree, in display order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum VisibleRow {
    Row {
        depth: usize,
        expanded: bool,
        row: Arc<Row>,
    },
    /// Placeholder after the loaded children of a group that has more.
    #[serde(rename_all = "camelCase")]
    LoadMore {
        depth: usize,
        parent: RowId,
        skip: usize,
    },
}

/// Walk the forest depth-first, descending only into expanded groups.
pub fn visible_rows(forest: &[Arc<Row>], expanded: &BTreeSet<RowId>) -> Vec<VisibleRow> {
    let mut out = Vec::new();
    push_level(forest, expanded, 0, &mut out);
    out
}

fn push_level(level: &[Arc<Row>], expanded: &BTreeSet<RowId>, depth: usize, out: &mut Vec<VisibleRow>) {
    for row in level {
        let is_expanded = row.is_group() && expanded.contains(row.row_id());
        out.push(VisibleRow::Row {
            depth,
            expanded: is_expanded,
            row: Arc::clone(row),
        });

        let Some(group) = row.as_group().filter(|_| is_expanded) else {
            continue;
        };
        if let Some(children) = &group.sub_rows {
            push_level(children, expanded, depth + 1, out);
        }
        if group.has_more() {
            out.push(VisibleRow::LoadMore {
                depth: depth + 1,
                parent: group.row_id.clone(),
                skip: group.loaded_sub_rows(),
            });
        }
    }
}
