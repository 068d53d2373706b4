use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One aggregate bucket returned by a grouping query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobGroup {
    pub name: String,
    pub count: usize,
    #[serde(default)]
    pub aggregates: BTreeMap<String, serde_json::Value>,
}

impl JobGroup {
    pub fn new(name: impl Into<String>, count: usize) -> Self {
        Self {
            name: name.into(),
            count,
            aggregates: BTreeMap::new(),
        }
    }
}
