use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{JobOrder, Predicate};
use crate::query::translate::{group_order, request_predicates, ColumnFilter};
use crate::tree::{RowId, RowIdInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page_index: usize,
    pub page_size: usize,
}

impl Pagination {
    pub fn new(page_index: usize, page_size: usize) -> Self {
        Self {
            page_index,
            page_size,
        }
    }

    pub fn skip(&self) -> usize {
        self.page_index * self.page_size
    }
}

/// Request for the next page of an expanded group's children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadMoreRequest {
    pub row_id: RowId,
    pub skip: usize,
}

/// Everything the user controls that decides what must be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableState {
    pub grouping: Vec<String>,
    pub expanded: BTreeSet<RowId>,
    pub pagination: Pagination,
    pub column_filters: Vec<ColumnFilter>,
    pub order: JobOrder,
    pub load_more: Option<LoadMoreRequest>,
}

impl TableState {
    pub fn new(grouping: Vec<String>, pagination: Pagination, order: JobOrder) -> Self {
        Self {
            grouping,
            expanded: BTreeSet::new(),
            pagination,
            column_filters: Vec::new(),
            order,
            load_more: None,
        }
    }

    /// The parts of the state a fetched page depends on. A page fetched under
    /// one key must not be merged once the key has changed.
    pub fn query_key(&self) -> QueryKey {
        QueryKey {
            grouping: self.grouping.clone(),
            column_filters: self.column_filters.clone(),
            order: self.order.clone(),
            pagination: self.pagination,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryKey {
    pub grouping: Vec<String>,
    pub column_filters: Vec<ColumnFilter>,
    pub order: JobOrder,
    pub pagination: Pagination,
}

/// What changed between two snapshots, by value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateDiff {
    pub grouping: bool,
    pub filters: bool,
    pub sort: bool,
    pub pagination: bool,
    pub load_more: bool,
    pub newly_expanded: Vec<RowId>,
    pub newly_collapsed: Vec<RowId>,
}

impl StateDiff {
    /// `previous` is `None` before the first pass, which counts as every
    /// root-level input having changed.
    pub fn between(previous: Option<&TableState>, current: &TableState) -> Self {
        let Some(previous) = previous else {
            return Self {
                grouping: true,
                filters: true,
                sort: true,
                pagination: true,
                load_more: current.load_more.is_some(),
                newly_expanded: current.expanded.iter().cloned().collect(),
                newly_collapsed: Vec::new(),
            };
        };

        Self {
            grouping: previous.grouping != current.grouping,
            filters: previous.column_filters != current.column_filters,
            sort: previous.order != current.order,
            pagination: previous.pagination != current.pagination,
            load_more: current.load_more.is_some() && previous.load_more != current.load_more,
            newly_expanded: current.expanded.difference(&previous.expanded).cloned().collect(),
            newly_collapsed: previous.expanded.difference(&current.expanded).cloned().collect(),
        }
    }

    pub fn root_changed(&self) -> bool {
        self.grouping || self.filters || self.sort || self.pagination
    }

    pub fn is_empty(&self) -> bool {
        !self.root_changed()
            && !self.load_more
            && self.newly_expanded.is_empty()
            && self.newly_collapsed.is_empty()
    }

    pub fn only_collapsed(&self) -> bool {
        !self.root_changed()
            && !self.load_more
            && self.newly_expanded.is_empty()
            && !self.newly_collapsed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchKind {
    /// Leaf rows via the jobs service
    Jobs,
    /// Group rows for the next dimension via the grouping service
    Groups {
        field: String,
        aggregates: Vec<String>,
    },
}

/// The single request a pass issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    /// Group the page belongs under; `None` for the root page.
    pub parent: Option<RowIdInfo>,
    pub append: bool,
    pub kind: FetchKind,
    pub filters: Vec<Predicate>,
    pub order: JobOrder,
    pub skip: usize,
    pub take: usize,
}

impl FetchPlan {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn location(&self) -> &[RowId] {
        self.parent
            .as_ref()
            .map_or(&[][..], |info| info.path_from_root.as_slice())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Nothing relevant changed
    Unchanged,
    /// Rows were only collapsed, which is purely local
    CollapseOnly,
    /// A change was seen but there is nothing valid to fetch for it
    Skip,
    Fetch(FetchPlan),
}

/// Decide the one fetch needed to bring the tree in line with `current`.
///
/// `refresh` names an expanded row whose children were dropped by a root
/// rebuild and must be fetched again. `aggregates` are the fields group
/// requests ask the service to aggregate.
pub fn plan_pass(
    previous: Option<&TableState>,
    current: &TableState,
    refresh: Option<&RowId>,
    aggregates: &[String],
) -> Decision {
    let diff = StateDiff::between(previous, current);

    if diff.is_empty() && refresh.is_none() {
        tracing::debug!("No relevant state change, not fetching");
        return Decision::Unchanged;
    }
    if diff.only_collapsed() && refresh.is_none() {
        tracing::debug!(collapsed = diff.newly_collapsed.len(), "Only collapsing, not fetching");
        return Decision::CollapseOnly;
    }

    let target = if diff.root_changed() {
        None
    } else {
        let mut candidates: Vec<(RowId, bool, usize)> = Vec::new();
        if let Some(request) = current.load_more.as_ref().filter(|_| diff.load_more) {
            candidates.push((request.row_id.clone(), true, request.skip));
        }
        if let Some(row_id) = refresh {
            candidates.push((row_id.clone(), false, 0));
        }
        candidates.extend(diff.newly_expanded.iter().map(|id| (id.clone(), false, 0)));

        if candidates.len() > 1 {
            tracing::warn!(
                rows = ?candidates.iter().map(|(id, _, _)| id.as_str()).collect::<Vec<_>>(),
                "More than one row needs children fetched, only the first is loaded"
            );
        }
        match candidates.into_iter().next() {
            Some(candidate) => Some(candidate),
            None => return Decision::Unchanged,
        }
    };

    let (parent, append, skip) = match target {
        None => (None, false, current.pagination.skip()),
        Some((row_id, append, skip)) => match row_id.decode() {
            Ok(info) => (Some(info), append, skip),
            Err(e) => {
                tracing::warn!(row_id = %row_id, error = %e, "Cannot load children of row");
                return Decision::Skip;
            }
        },
    };

    let level = parent.as_ref().map_or(0, RowIdInfo::depth);
    if level > current.grouping.len() {
        tracing::warn!(
            level,
            grouping = ?current.grouping,
            "Row is below the deepest grouping level and has no children"
        );
        return Decision::Skip;
    }

    let parts = parent.as_ref().map_or(&[][..], |info| info.parts_path.as_slice());
    let filters = request_predicates(parts, &current.column_filters);
    let (kind, order) = if level == current.grouping.len() {
        (FetchKind::Jobs, current.order.clone())
    } else {
        let field = current.grouping[level].clone();
        let order = group_order(&current.order, &field);
        (
            FetchKind::Groups {
                field,
                aggregates: aggregates.to_vec(),
            },
            order,
        )
    };

    Decision::Fetch(FetchPlan {
        parent,
        append,
        kind,
        filters,
        order,
        skip,
        take: current.pagination.page_size,
    })
}
