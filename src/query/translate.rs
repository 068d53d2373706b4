use serde::{Deserialize, Serialize};

use crate::model::{JobOrder, Predicate, SortDirection};
use crate::tree::RowIdPart;

/// Field name the query service sorts groups by.
pub const GROUP_NAME_FIELD: &str = "name";

/// A filter set on a column by the user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnFilter {
    pub column: String,
    pub value: FilterValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "match", content = "value", rename_all = "camelCase")]
pub enum FilterValue {
    Exact(String),
    Substring(String),
    /// Multi-select
    AnyOf(Vec<String>),
}

impl ColumnFilter {
    pub fn new(column: impl Into<String>, value: FilterValue) -> Self {
        Self {
            column: column.into(),
            value,
        }
    }
}

/// Exact-match predicates pinning a request to one subtree.
pub fn path_predicates(parts_path: &[RowIdPart]) -> Vec<Predicate> {
    parts_path
        .iter()
        .map(|part| Predicate::exact(&part.kind, &part.value))
        .collect()
}

pub fn column_predicates(filters: &[ColumnFilter]) -> Vec<Predicate> {
    filters
        .iter()
        .map(|filter| match &filter.value {
            FilterValue::Exact(value) => Predicate::exact(&filter.column, value),
            FilterValue::Substring(value) => Predicate::substring(&filter.column, value),
            FilterValue::AnyOf(values) => Predicate::any_of(&filter.column, values.clone()),
        })
        .collect()
}

/// Full predicate list for a request under `parts_path`.
pub fn request_predicates(parts_path: &[RowIdPart], filters: &[ColumnFilter]) -> Vec<Predicate> {
    let mut predicates = path_predicates(parts_path);
    predicates.extend(column_predicates(filters));
    predicates
}

/// Groups are always ordered by name. The requested direction only applies
/// when the table is sorted by the grouped column itself.
pub fn group_order(order: &JobOrder, group_field: &str) -> JobOrder {
    let direction = if order.field == group_field {
        order.direction
    } else {
        SortDirection::Asc
    };
    JobOrder::new(GROUP_NAME_FIELD, direction)
}
