//! Test harness for jobs table integration tests.
//!
//! Provides query services that record, fail or hang, and helpers for
//! building tables over them.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use lookout_lite::config::TableConfig;
use lookout_lite::error::{LookoutError, Result};
use lookout_lite::model::{JobOrder, Predicate};
use lookout_lite::query::fake::test_jobs;
use lookout_lite::query::{
    FakeJobsService, GetJobsResponse, GetJobsService, GroupJobsResponse, GroupJobsService,
};
use lookout_lite::table::{JobsTable, PassStart, PendingFetch};
use lookout_lite::tree::{Row, RowId};

/// One request seen by a [`RecordingService`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Jobs {
        filters: Vec<Predicate>,
        order: JobOrder,
        skip: usize,
        take: usize,
    },
    Groups {
        field: String,
        filters: Vec<Predicate>,
        order: JobOrder,
        skip: usize,
        take: usize,
    },
}

/// Wraps a [`FakeJobsService`], logging every request and failing on demand.
pub struct RecordingService {
    inner: FakeJobsService,
    calls: Mutex<Vec<Call>>,
    failing: AtomicBool,
}

impl RecordingService {
    pub fn new(inner: FakeJobsService) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_call(&self) -> Option<Call> {
        self.calls.lock().unwrap().last().cloned()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Make every following request fail until turned off again.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_failing(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(LookoutError::FetchFailed("service unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl GetJobsService for RecordingService {
    async fn get_jobs(
        &self,
        filters: &[Predicate],
        order: &JobOrder,
        skip: usize,
        take: usize,
        cancel: &CancellationToken,
    ) -> Result<GetJobsResponse> {
        self.calls.lock().unwrap().push(Call::Jobs {
            filters: filters.to_vec(),
            order: order.clone(),
            skip,
            take,
        });
        self.check_failing()?;
        self.inner.get_jobs(filters, order, skip, take, cancel).await
    }
}

#[async_trait]
impl GroupJobsService for RecordingService {
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
        self.calls.lock().unwrap().push(Call::Groups {
            field: group_field.to_string(),
            filters: filters.to_vec(),
            order: order.clone(),
            skip,
            take,
        });
        self.check_failing()?;
        self.inner
            .group_jobs(filters, order, group_field, aggregates, skip, take, cancel)
            .await
    }
}

/// A service that never answers. Only cancellation ends its requests.
pub struct HangingService;

#[async_trait]
impl GetJobsService for HangingService {
    async fn get_jobs(
        &self,
        _filters: &[Predicate],
        _order: &JobOrder,
        _skip: usize,
        _take: usize,
        _cancel: &CancellationToken,
    ) -> Result<GetJobsResponse> {
        std::future::pending().await
    }
}

#[async_trait]
impl GroupJobsService for HangingService {
    async fn group_jobs(
        &self,
        _filters: &[Predicate],
        _order: &JobOrder,
        _group_field: &str,
        _aggregates: &[String],
        _skip: usize,
        _take: usize,
        _cancel: &CancellationToken,
    ) -> Result<GroupJobsResponse> {
        std::future::pending().await
    }
}

/// A table over `test_jobs(count, queues, job_sets)` with a recording service.
pub fn recorded_table(
    count: usize,
    queues: usize,
    job_sets: usize,
    page_size: usize,
    grouping: &[&str],
) -> (JobsTable, Arc<RecordingService>) {
    let service = Arc::new(RecordingService::new(FakeJobsService::new(test_jobs(
        count, queues, job_sets,
    ))));
    let config = TableConfig::new(page_size).with_grouping(grouping.iter().copied());
    let table = JobsTable::with_service(config, Arc::clone(&service));
    (table, service)
}

/// Start a pass that is expected to fetch.
pub fn begin_fetch(table: &mut JobsTable) -> PendingFetch {
    match table.begin_pass() {
        PassStart::Fetch(pending) => pending,
        PassStart::Done(outcome) => panic!("expected a fetch, pass finished with {outcome:?}"),
    }
}

pub fn row_id(raw: &str) -> RowId {
    RowId::parse(raw).unwrap()
}

/// Ids of the direct children of a loaded group.
pub fn child_ids(table: &JobsTable, parent: &str) -> Vec<String> {
    table
        .find_row(&row_id(parent))
        .and_then(|row| {
            row.sub_rows()
                .map(|rows| rows.iter().map(|r| r.row_id().to_string()).collect())
        })
        .unwrap_or_default()
}

pub fn root_ids(table: &JobsTable) -> Vec<String> {
    table
        .forest()
        .iter()
        .map(|row| row.row_id().to_string())
        .collect()
}

pub fn group_count(row: &Row) -> usize {
    row.as_group().map_or(0, |group| group.job_count)
}
