use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;

use crate::error::{LookoutError, Result};
use crate::model::{JobGroup, JobOrder, JobRecord, JobState, Predicate, SortDirection};
use crate::query::translate::GROUP_NAME_FIELD;
use crate::query::{GetJobsResponse, GetJobsService, GroupJobsResponse, GroupJobsService};

const BASE_SUBMIT_SECS: i64 = 1_700_000_000;
const TEAMS: [&str; 3] = ["infra", "ml", "data"];
const STATE_CYCLE: [JobState; 6] = [
    JobState::Failed,
    JobState::Queued,
    JobState::Pending,
    JobState::Running,
    JobState::Succeeded,
    JobState::Cancelled,
];

/// In-memory query service over a fixed job list.
#[derive(Debug, Clone, Default)]
pub struct FakeJobsService {
    jobs: Vec<JobRecord>,
}

impl FakeJobsService {
    pub fn new(jobs: Vec<JobRecord>) -> Self {
        Self { jobs }
    }

    pub fn jobs(&self) -> &[JobRecord] {
        &self.jobs
    }

    fn filtered(&self, filters: &[Predicate]) -> Vec<&JobRecord> {
        self.jobs
            .iter()
            .filter(|job| filters.iter().all(|p| matches_predicate(job, p)))
            .collect()
    }
}

fn matches_predicate(job: &JobRecord, predicate: &Predicate) -> bool {
    job.field_value(&predicate.field)
        .is_some_and(|value| predicate.value.matches(predicate.match_kind, &value))
}

/// Numbers compare numerically, everything else lexically.
fn compare_values(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

/// Aggregate of one field across a group: the sum for numeric fields, the
/// shared value when every job agrees, otherwise the number of distinct values.
fn aggregate(jobs: &[&JobRecord], field: &str) -> serde_json::Value {
    let values: Vec<String> = jobs.iter().filter_map(|job| job.field_value(field)).collect();
    let numbers: Option<Vec<f64>> = values.iter().map(|v| v.parse::<f64>().ok()).collect();
    if let Some(numbers) = numbers.filter(|n| !n.is_empty()) {
        return serde_json::json!(numbers.iter().sum::<f64>());
    }

    let distinct: BTreeSet<&String> = values.iter().collect();
    match distinct.len() {
        1 => serde_json::json!(distinct.into_iter().next()),
        n => serde_json::json!(n),
    }
}

#[async_trait]
impl GetJobsService for FakeJobsService {
    async fn get_jobs(
        &self,
        filters: &[Predicate],
        order: &JobOrder,
        skip: usize,
        take: usize,
        cancel: &CancellationToken,
    ) -> Result<GetJobsResponse> {
        if cancel.is_cancelled() {
            return Err(LookoutError::Cancelled);
        }

        let mut jobs = self.filtered(filters);
        jobs.sort_by(|a, b| {
            let ordering = match (a.field_value(&order.field), b.field_value(&order.field)) {
                (Some(x), Some(y)) => compare_values(&x, &y),
                _ => Ordering::Equal,
            };
            directed(ordering, order.direction)
        });

        let total_jobs = jobs.len();
        let jobs = jobs.into_iter().skip(skip).take(take).cloned().collect();
        Ok(GetJobsResponse { jobs, total_jobs })
    }
}

#[async_trait]
impl GroupJobsService for FakeJobsService {
    async fn group_jobs(
        &self,
        filters: &[Predicate],
        order: &JobOrder,
        group_field: &str,
        aggregates: &[String],
        skip: usize,
        take: usize,
        cancel: &CancellationToken,
    ) -> Result<GroupJobsResponse> {
        if cancel.is_cancelled() {
            return Err(LookoutError::Cancelled);
        }

        let mut buckets: BTreeMap<String, Vec<&JobRecord>> = BTreeMap::new();
        for job in self.filtered(filters) {
            if let Some(value) = job.field_value(group_field) {
                buckets.entry(value).or_default().push(job);
            }
        }

        let mut groups: Vec<JobGroup> = buckets
            .into_iter()
            .map(|(name, jobs)| {
                let aggregates = aggregates
                    .iter()
                    .filter(|field| field.as_str() != group_field)
                    .map(|field| (field.clone(), aggregate(&jobs, field)))
                    .collect();
                JobGroup {
                    name,
                    count: jobs.len(),
                    aggregates,
                }
            })
            .collect();

        groups.sort_by(|a, b| {
            let ordering = if order.field == GROUP_NAME_FIELD {
                compare_values(&a.name, &b.name)
            } else {
                a.count.cmp(&b.count).then_with(|| a.name.cmp(&b.name))
            };
            directed(ordering, order.direction)
        });

        let total_groups = groups.len();
        let groups = groups.into_iter().skip(skip).take(take).collect();
        Ok(GroupJobsResponse {
            groups,
            total_groups,
        })
    }
}

/// Deterministic jobs: job `i` is in `queue-{i % queues + 1}` and
/// `job-set-{i % job_sets + 1}`, with states cycling from `Failed`.
pub fn test_jobs(count: usize, queues: usize, job_sets: usize) -> Vec<JobRecord> {
    let queues = queues.max(1);
    let job_sets = job_sets.max(1);
    (0..count)
        .map(|i| JobRecord {
            job_id: i.to_string(),
            queue: format!("queue-{}", i % queues + 1),
            job_set: format!("job-set-{}", i % job_sets + 1),
            state: STATE_CYCLE[i % STATE_CYCLE.len()],
            cpu: 4000,
            memory: "24Gi".to_string(),
            ephemeral_storage: "32Gi".to_string(),
            submitted: DateTime::<Utc>::from_timestamp(BASE_SUBMIT_SECS + i as i64 * 60, 0)
                .unwrap_or_default(),
            annotations: BTreeMap::from([("team".to_string(), TEAMS[i % TEAMS.len()].to_string())]),
        })
        .collect()
}

/// Randomized but reproducible dataset for demos.
pub fn generate_jobs(count: usize, seed: u64, queues: usize, job_sets: usize) -> Vec<JobRecord> {
    let queues = queues.max(1);
    let job_sets = job_sets.max(1);
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let id = uuid::Builder::from_random_bytes(rng.gen()).into_uuid();
            JobRecord {
                job_id: id.to_string(),
                queue: format!("queue-{}", rng.gen_range(0..queues) + 1),
                job_set: format!("job-set-{}", rng.gen_range(0..job_sets) + 1),
                state: JobState::ALL[rng.gen_range(0..JobState::ALL.len())],
                cpu: rng.gen_range(1..=16u64) * 250,
                memory: format!("{}Gi", rng.gen_range(1..=64)),
                ephemeral_storage: format!("{}Gi", rng.gen_range(1..=128)),
                submitted: DateTime::<Utc>::from_timestamp(
                    BASE_SUBMIT_SECS + i as i64 * rng.gen_range(1..=120),
                    0,
                )
                .unwrap_or_default(),
                annotations: BTreeMap::from([(
                    "team".to_string(),
                    TEAMS[rng.gen_range(0..TEAMS.len())].to_string(),
                )]),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> FakeJobsService {
        FakeJobsService::new(test_jobs(5, 2, 3))
    }

    #[test]
    fn test_jobs_layout() {
        let jobs = test_jobs(5, 2, 3);
        assert_eq!(jobs[0].queue, "queue-1");
        assert_eq!(jobs[0].job_set, "job-set-1");
        assert_eq!(jobs[0].state, JobState::Failed);
        assert_eq!(jobs[1].queue, "queue-2");
        assert_eq!(jobs[1].job_set, "job-set-2");
        assert_eq!(jobs[1].state, JobState::Queued);
        assert_eq!(jobs[3].job_set, "job-set-1");
    }

    #[test]
    fn generated_jobs_are_reproducible() {
        let a = generate_jobs(20, 7, 3, 4);
        let b = generate_jobs(20, 7, 3, 4);
        assert_eq!(a, b);
        assert!(a.iter().all(|j| j.queue.starts_with("queue-")));
    }

    #[tokio::test]
    async fn get_jobs_filters_sorts_and_pages() {
        let svc = service();
        let token = CancellationToken::new();
        let filters = vec![Predicate::exact("queue", "queue-1")];

        let resp = svc
            .get_jobs(&filters, &JobOrder::desc("jobId"), 0, 2, &token)
            .await
            .unwrap();
        assert_eq!(resp.total_jobs, 3);
        let ids: Vec<&str> = resp.jobs.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, vec!["4", "2"]);

        let rest = svc
            .get_jobs(&filters, &JobOrder::desc("jobId"), 2, 2, &token)
            .await
            .unwrap();
        assert_eq!(rest.jobs.len(), 1);
        assert_eq!(rest.jobs[0].job_id, "0");
    }

    #[tokio::test]
    async fn group_jobs_counts_and_orders_groups() {
        let svc = service();
        let token = CancellationToken::new();
        let resp = svc
            .group_jobs(&[], &JobOrder::desc("name"), "queue", &["cpu".to_string()], 0, 10, &token)
            .await
            .unwrap();

        assert_eq!(resp.total_groups, 2);
        assert_eq!(resp.groups[0].name, "queue-2");
        assert_eq!(resp.groups[0].count, 2);
        assert_eq!(resp.groups[1].count, 3);
        assert_eq!(resp.groups[1].aggregates["cpu"], serde_json::json!(12000.0));
    }

    #[tokio::test]
    async fn group_jobs_by_annotation_with_any_of_filter() {
        let svc = service();
        let token = CancellationToken::new();
        let filters = vec![Predicate::any_of("state", vec!["Failed".into(), "Queued".into()])];
        let resp = svc
            .group_jobs(&filters, &JobOrder::asc("name"), "team", &[], 0, 10, &token)
            .await
            .unwrap();

        let names: Vec<&str> = resp.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["infra", "ml"]);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let err = service()
            .get_jobs(&[], &JobOrder::default(), 0, 10, &token)
            .await
            .unwrap_err();
        assert_eq!(err, LookoutError::Cancelled);
    }
}
