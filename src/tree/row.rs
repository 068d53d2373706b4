use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::model::{JobGroup, JobRecord};
use crate::tree::row_id::RowId;

/// Top-level rows currently materialized. Rows are shared between snapshots,
/// so a forest is never mutated in place.
pub type Forest = Vec<Arc<Row>>;

/// A node of the jobs tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Row {
    Job(JobRow),
    Group(GroupRow),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRow {
    pub row_id: RowId,
    #[serde(flatten)]
    pub job: JobRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRow {
    pub row_id: RowId,
    pub dimension: String,
    pub value: String,
    /// Jobs under this group at any depth, as reported when it was fetched.
    pub job_count: usize,
    pub aggregates: BTreeMap<String, serde_json::Value>,
    /// Direct children available under the current filters, once known.
    pub sub_row_count: Option<usize>,
    /// `None` until the first page of children has been merged.
    pub sub_rows: Option<Vec<Arc<Row>>>,
}

impl GroupRow {
    pub fn loaded_sub_rows(&self) -> usize {
        self.sub_rows.as_ref().map_or(0, Vec::len)
    }

    /// Whether more children exist than have been loaded.
    pub fn has_more(&self) -> bool {
        self.sub_row_count
            .is_some_and(|total| total > self.loaded_sub_rows())
    }
}

impl Row {
    pub fn row_id(&self) -> &RowId {
        match self {
            Row::Job(job) => &job.row_id,
            Row::Group(group) => &group.row_id,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Row::Group(_))
    }

    pub fn as_group(&self) -> Option<&GroupRow> {
        match self {
            Row::Group(group) => Some(group),
            Row::Job(_) => None,
        }
    }

    pub fn sub_rows(&self) -> Option<&[Arc<Row>]> {
        self.as_group()
            .and_then(|group| group.sub_rows.as_deref())
    }
}

/// Leaf rows for a page of jobs fetched under `parent`.
pub fn jobs_to_rows(jobs: Vec<JobRecord>, parent: Option<&RowId>) -> Vec<Arc<Row>> {
    jobs.into_iter()
        .map(|job| {
            Arc::new(Row::Job(JobRow {
                row_id: RowId::for_job(&job.job_id, parent),
                job,
            }))
        })
        .collect()
}

/// Group rows for a page of groups fetched under `parent`.
pub fn groups_to_rows(groups: Vec<JobGroup>, parent: Option<&RowId>, dimension: &str) -> Vec<Arc<Row>> {
    groups
        .into_iter()
        .map(|group| {
            Arc::new(Row::Group(GroupRow {
                row_id: RowId::new(dimension, &group.name, parent),
                dimension: dimension.to_string(),
                value: group.name,
                job_count: group.count,
                aggregates: group.aggregates,
                sub_row_count: None,
                sub_rows: None,
            }))
        })
        .collect()
}

/// Find a row anywhere in the forest by walking its ancestor path.
pub fn find_row(forest: &[Arc<Row>], row_id: &RowId) -> Option<Arc<Row>> {
    let info = row_id.decode().ok()?;
    let mut level: &[Arc<Row>] = forest;
    let mut found: Option<&Arc<Row>> = None;
    for step in &info.path_from_root {
        let row = level.iter().find(|r| r.row_id() == step)?;
        level = row.sub_rows().unwrap_or(&[]);
        found = Some(row);
    }
    found.cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobState;

    #[test]
    fn jobs_become_leaf_rows() {
        let rows = jobs_to_rows(vec![JobRecord::new("3", "q", "js").with_state(JobState::Failed)], None);
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].is_group());
        assert_eq!(rows[0].row_id().as_str(), "job:3");
        assert!(rows[0].sub_rows().is_none());

        let parent = RowId::new("queue", "q", None);
        let nested = jobs_to_rows(vec![JobRecord::new("4", "q", "js")], Some(&parent));
        assert_eq!(nested[0].row_id().as_str(), "queue:q>job:4");
    }

    #[test]
    fn groups_nest_ids_under_parent() {
        let parent = RowId::new("queue", "queue-1", None);
        let rows = groups_to_rows(vec![JobGroup::new("job-set-1", 4)], Some(&parent), "jobSet");
        let group = rows[0].as_group().unwrap();
        assert_eq!(group.row_id.as_str(), "queue:queue-1>jobSet:job-set-1");
        assert_eq!(group.dimension, "jobSet");
        assert_eq!(group.value, "job-set-1");
        assert_eq!(group.job_count, 4);
        assert!(group.sub_rows.is_none());
        assert!(!group.has_more());
    }

    #[test]
    fn has_more_compares_count_with_loaded() {
        let mut group = groups_to_rows(vec![JobGroup::new("q", 3)], None, "queue")[0]
            .as_group()
            .cloned()
            .unwrap();
        group.sub_row_count = Some(3);
        group.sub_rows = Some(jobs_to_rows(vec![JobRecord::new("1", "q", "js")], None));
        assert!(group.has_more());
        group.sub_row_count = Some(1);
        assert!(!group.has_more());
    }

    #[test]
    fn serializes_as_tagged_union() {
        let rows = groups_to_rows(vec![JobGroup::new("q", 3)], None, "queue");
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["kind"], "group");
        assert_eq!(json["rowId"], "queue:q");
        assert_eq!(json["jobCount"], 3);
        assert!(json["subRows"].is_null());
    }
}
