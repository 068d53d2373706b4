//! Boundary to the remote job query service.
//!
//! The tree never filters, sorts or counts jobs itself. It asks a
//! [`GetJobsService`] for pages of flat job records and a [`GroupJobsService`]
//! for pages of aggregate groups, passing a [`CancellationToken`] that is
//! cancelled once the answer can no longer be used. Implementations may
//! ignore the token; the caller discards stale answers either way.
//!
//! [`FakeJobsService`] implements both over an in-memory job list.

pub mod fake;
pub mod translate;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::model::{JobGroup, JobOrder, JobRecord, Predicate};

pub use fake::FakeJobsService;
pub use translate::{ColumnFilter, FilterValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetJobsResponse {
    pub jobs: Vec<JobRecord>,
    pub total_jobs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupJobsResponse {
    pub groups: Vec<JobGroup>,
    pub total_groups: usize,
}

#[async_trait]
pub trait GetJobsService: Send + Sync {
    async fn get_jobs(
        &self,
        filters: &[Predicate],
        order: &JobOrder,
        skip: usize,
        take: usize,
        cancel: &CancellationToken,
    ) -> Result<GetJobsResponse>;
}

#[async_trait]
pub trait GroupJobsService: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn group_jobs(
        &self,
        filters: &[Predicate],
        order: &JobOrder,
        group_field: &str,
        aggregates: &[String],
        skip: usize,
        take: usize,
        cancel: &CancellationToken,
    ) -> Result<GroupJobsResponse>;
}
