use std::net::SocketAddr;

use serde::Serialize;

use crate::model::JobOrder;

pub const DEFAULT_PAGE_SIZE: usize = 30;

/// Column metadata. Only grouping and aggregation read it; how a column is
/// drawn is up to the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSpec {
    /// Field name on the wire, e.g. `jobSet`
    pub key: String,
    pub name: String,
    /// Whether the column is displayed
    pub selected: bool,
    pub is_annotation: bool,
    /// Groupable columns can be used as dimensions and are aggregated on group rows
    pub groupable: bool,
    pub min_size: u16,
}

impl ColumnSpec {
    fn builtin(key: &str, name: &str, groupable: bool, min_size: u16) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            selected: true,
            is_annotation: false,
            groupable,
            min_size,
        }
    }

    /// Column backed by a job annotation. Annotations can always be grouped on.
    pub fn annotation(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            selected: true,
            is_annotation: true,
            groupable: true,
            min_size: 30,
        }
    }
}

pub fn default_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::builtin("jobId", "Job Id", false, 30),
        ColumnSpec::builtin("jobSet", "Job Set", true, 100),
        ColumnSpec::builtin("queue", "Queue", true, 95),
        ColumnSpec::builtin("state", "State", true, 60),
        ColumnSpec::builtin("cpu", "CPU", false, 60),
        ColumnSpec::builtin("memory", "Memory", false, 70),
        ColumnSpec::builtin("ephemeralStorage", "Eph. Storage", false, 95),
    ]
}

/// Defaults for a jobs table.
#[derive(Debug, Clone)]
pub struct TableConfig {
    pub page_size: usize,
    pub page_size_options: Vec<usize>,
    pub grouping: Vec<String>,
    pub order: JobOrder,
    pub columns: Vec<ColumnSpec>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            page_size_options: vec![3, 10, 20, 30, 40, 50],
            grouping: Vec::new(),
            order: JobOrder::default(),
            columns: default_columns(),
        }
    }
}

impl TableConfig {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            ..Default::default()
        }
    }

    pub fn with_grouping<S: Into<String>>(mut self, grouping: impl IntoIterator<Item = S>) -> Self {
        self.grouping = grouping.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_order(mut self, order: JobOrder) -> Self {
        self.order = order;
        self
    }
}

/// Settings for the `serve` command.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub listen_addr: SocketAddr,
    pub jobs: usize,
    pub seed: u64,
    pub queues: usize,
    pub job_sets: usize,
    pub table: TableConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8089)),
            jobs: 1000,
            seed: 42,
            queues: 4,
            job_sets: 10,
            table: TableConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SortDirection;

    #[test]
    fn table_config_default() {
        let cfg = TableConfig::default();
        assert_eq!(cfg.page_size, 30);
        assert!(cfg.grouping.is_empty());
        assert_eq!(cfg.order.field, "jobId");
        assert_eq!(cfg.order.direction, SortDirection::Asc);
        assert_eq!(cfg.columns.len(), 7);
        assert!(cfg.page_size_options.contains(&cfg.page_size));
    }

    #[test]
    fn table_config_builders() {
        let cfg = TableConfig::new(10)
            .with_grouping(["queue", "jobSet"])
            .with_order(JobOrder::desc("cpu"));
        assert_eq!(cfg.page_size, 10);
        assert_eq!(cfg.grouping, vec!["queue".to_string(), "jobSet".to_string()]);
        assert_eq!(cfg.order, JobOrder::desc("cpu"));
    }

    #[test]
    fn groupable_columns() {
        let groupable: Vec<String> = default_columns()
            .into_iter()
            .filter(|c| c.groupable)
            .map(|c| c.key)
            .collect();
        assert_eq!(groupable, vec!["jobSet", "queue", "state"]);
    }

    #[test]
    fn annotation_columns_are_groupable() {
        let col = ColumnSpec::annotation("team");
        assert_eq!(col.key, "team");
        assert!(col.is_annotation);
        assert!(col.groupable);
    }

    #[test]
    fn dashboard_config_default() {
        let cfg = DashboardConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:8089");
        assert_eq!(cfg.jobs, 1000);
        assert_eq!(cfg.table.page_size, DEFAULT_PAGE_SIZE);
    }
}
