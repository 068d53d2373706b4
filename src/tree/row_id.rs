use serde::{Deserialize, Serialize};

use crate::error::{LookoutError, Result};

pub const SEGMENT_SEPARATOR: char = '>';
pub const PART_SEPARATOR: char = ':';
/// Segment type used for leaf rows.
pub const JOB_SEGMENT: &str = "job";

/// Path-encoded row identifier, e.g. `queue:queue-2>jobSet:job-set-1>job:17`.
///
/// Ids are built only through [`RowId::new`], which does not escape its inputs:
/// a `type` or `value` containing `:` or `>` produces an id that no longer
/// decodes to the same path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(String);

/// One `type:value` segment of a [`RowId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowIdPart {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl RowIdPart {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

/// Decoded form of a [`RowId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowIdInfo {
    pub row_id: RowId,
    /// Key/value of every level, root first.
    pub parts_path: Vec<RowIdPart>,
    /// Id of every ancestor and of the row itself, root first.
    pub path_from_root: Vec<RowId>,
}

impl RowIdInfo {
    pub fn depth(&self) -> usize {
        self.parts_path.len()
    }
}

impl RowId {
    pub fn new(kind: &str, value: &str, parent: Option<&RowId>) -> Self {
        match parent {
            Some(parent) => RowId(format!(
                "{}{SEGMENT_SEPARATOR}{kind}{PART_SEPARATOR}{value}",
                parent.0
            )),
            None => RowId(format!("{kind}{PART_SEPARATOR}{value}")),
        }
    }

    /// Id of a leaf row for the given job.
    pub fn for_job(job_id: &str, parent: Option<&RowId>) -> Self {
        Self::new(JOB_SEGMENT, job_id, parent)
    }

    /// Wrap a raw string after checking that it decodes.
    pub fn parse(raw: &str) -> Result<Self> {
        let id = RowId(raw.to_string());
        id.decode()?;
        Ok(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn decode(&self) -> Result<RowIdInfo> {
        let mut parts_path = Vec::new();
        for segment in self.0.split(SEGMENT_SEPARATOR) {
            let mut pieces = segment.split(PART_SEPARATOR);
            match (pieces.next(), pieces.next(), pieces.next()) {
                (Some(kind), Some(value), None) if !kind.is_empty() => {
                    parts_path.push(RowIdPart::new(kind, value));
                }
                _ => return Err(LookoutError::MalformedRowId(self.0.clone())),
            }
        }

        let mut path_from_root: Vec<RowId> = Vec::with_capacity(parts_path.len());
        for part in &parts_path {
            let next = RowId::new(&part.kind, &part.value, path_from_root.last());
            path_from_root.push(next);
        }

        Ok(RowIdInfo {
            row_id: self.clone(),
            parts_path,
            path_from_root,
        })
    }

    /// Number of segments; does not validate.
    pub fn depth(&self) -> usize {
        self.0.split(SEGMENT_SEPARATOR).count()
    }

    /// Value of the `job` segment, if this id points at a leaf.
    pub fn job_id(&self) -> Option<&str> {
        self.0
            .split(SEGMENT_SEPARATOR)
            .filter_map(|segment| segment.split_once(PART_SEPARATOR))
            .find(|(kind, _)| *kind == JOB_SEGMENT)
            .map(|(_, value)| value)
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RowId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_root_and_child_segments() {
        let root = RowId::new("queue", "queue-2", None);
        assert_eq!(root.as_str(), "queue:queue-2");

        let child = RowId::new("jobSet", "job-set-1", Some(&root));
        assert_eq!(child.as_str(), "queue:queue-2>jobSet:job-set-1");

        let leaf = RowId::for_job("17", Some(&child));
        assert_eq!(leaf.as_str(), "queue:queue-2>jobSet:job-set-1>job:17");
    }

    #[test]
    fn decodes_parts_and_ancestors() {
        let info = RowId::parse("queue:queue-2>jobSet:job-set-1").unwrap().decode().unwrap();
        assert_eq!(
            info.parts_path,
            vec![
                RowIdPart::new("queue", "queue-2"),
                RowIdPart::new("jobSet", "job-set-1"),
            ]
        );
        assert_eq!(
            info.path_from_root,
            vec![
                RowId::new("queue", "queue-2", None),
                RowId::parse("queue:queue-2>jobSet:job-set-1").unwrap(),
            ]
        );
        assert_eq!(info.depth(), 2);
    }

    #[test]
    fn round_trips_arbitrary_paths() {
        let paths: Vec<Vec<(&str, &str)>> = vec![
            vec![("job", "0")],
            vec![("queue", "a"), ("job", "1")],
            vec![("state", "Running"), ("jobSet", "set-9"), ("queue", "q"), ("job", "x")],
            vec![("team", "")],
        ];

        for path in paths {
            let mut id: Option<RowId> = None;
            for (kind, value) in &path {
                id = Some(RowId::new(kind, value, id.as_ref()));
            }
            let id = id.unwrap();
            let info = id.decode().unwrap();

            assert_eq!(info.path_from_root.len(), path.len());
            assert_eq!(info.path_from_root.last(), Some(&id));
            for ((kind, value), part) in path.iter().zip(&info.parts_path) {
                assert_eq!(part.kind, *kind);
                assert_eq!(part.value, *value);
            }

            let mut rebuilt: Option<RowId> = None;
            for part in &info.parts_path {
                rebuilt = Some(RowId::new(&part.kind, &part.value, rebuilt.as_ref()));
            }
            assert_eq!(rebuilt, Some(id));
        }
    }

    #[test]
    fn rejects_malformed_ids() {
        for raw in ["", "queue", "queue:a>", ":a", "queue:a:b", "queue:a>>job:1"] {
            assert_eq!(
                RowId::parse(raw),
                Err(LookoutError::MalformedRowId(raw.to_string())),
                "{raw:?} should not decode"
            );
        }
    }

    #[test]
    fn extracts_job_id() {
        let leaf = RowId::parse("queue:q>job:42").unwrap();
        assert_eq!(leaf.job_id(), Some("42"));
        assert_eq!(RowId::new("queue", "q", None).job_id(), None);
    }
}
