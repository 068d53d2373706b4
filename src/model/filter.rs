use serde::{Deserialize, Serialize};

/// How a predicate value is compared by the query service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Match {
    Exact,
    AnyOf,
    Substring,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredicateValue {
    One(String),
    Many(Vec<String>),
}

impl PredicateValue {
    /// Whether `candidate` satisfies this value under `kind`.
    pub fn matches(&self, kind: Match, candidate: &str) -> bool {
        match (self, kind) {
            (PredicateValue::One(v), Match::Exact) => candidate == v,
            (PredicateValue::One(v), Match::Substring) => candidate.contains(v.as_str()),
            (PredicateValue::One(v), Match::AnyOf) => candidate == v,
            (PredicateValue::Many(vs), Match::Substring) => {
                vs.iter().any(|v| candidate.contains(v.as_str()))
            }
            (PredicateValue::Many(vs), _) => vs.iter().any(|v| v == candidate),
        }
    }
}

/// A single filter sent to the query service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Predicate {
    pub field: String,
    pub value: PredicateValue,
    #[serde(rename = "match")]
    pub match_kind: Match,
}

impl Predicate {
    pub fn exact(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: PredicateValue::One(value.into()),
            match_kind: Match::Exact,
        }
    }

    pub fn any_of(field: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            field: field.into(),
            value: PredicateValue::Many(values),
            match_kind: Match::AnyOf,
        }
    }

    pub fn substring(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: PredicateValue::One(value.into()),
            match_kind: Match::Substring,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobOrder {
    pub field: String,
    pub direction: SortDirection,
}

impl JobOrder {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Asc)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Desc)
    }
}

impl Default for JobOrder {
    fn default() -> Self {
        Self::asc("jobId")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_value_matching() {
        let one = PredicateValue::One("queue-1".to_string());
        assert!(one.matches(Match::Exact, "queue-1"));
        assert!(!one.matches(Match::Exact, "queue-10"));
        assert!(one.matches(Match::Substring, "queue-10"));

        let many = PredicateValue::Many(vec!["Running".to_string(), "Failed".to_string()]);
        assert!(many.matches(Match::AnyOf, "Failed"));
        assert!(!many.matches(Match::AnyOf, "Queued"));
    }

    #[test]
    fn predicate_serializes_match_tag() {
        let json = serde_json::to_value(Predicate::any_of("state", vec!["Running".into()])).unwrap();
        assert_eq!(json["field"], "state");
        assert_eq!(json["match"], "anyOf");
        assert_eq!(json["value"][0], "Running");
    }

    #[test]
    fn default_order_is_job_id_ascending() {
        let order = JobOrder::default();
        assert_eq!(order.field, "jobId");
        assert_eq!(order.direction, SortDirection::Asc);
    }
}
