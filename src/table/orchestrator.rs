use std::collections::BTreeSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{ColumnSpec, TableConfig};
use crate::error::{LookoutError, Result};
use crate::model::JobOrder;
use crate::query::translate::ColumnFilter;
use crate::query::{GetJobsService, GroupJobsService};
use crate::table::selection::Selection;
use crate::table::state::{
    plan_pass, Decision, FetchKind, FetchPlan, LoadMoreRequest, Pagination, QueryKey, TableState,
};
use crate::tree::{
    find_row, groups_to_rows, jobs_to_rows, merge_sub_rows, set_sub_row_count, visible_rows, Forest,
    Row, RowId, VisibleRow,
};

/// Upper bound on passes run by [`JobsTable::sync`].
const MAX_SYNC_PASSES: usize = 8;

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    Unchanged,
    CollapseOnly,
    Skipped,
    Merged {
        parent: Option<RowId>,
        rows: usize,
        total: usize,
    },
    /// The answer arrived after the state it was requested for had changed.
    Discarded,
    Failed(LookoutError),
}

pub enum PassStart {
    Fetch(PendingFetch),
    Done(PassOutcome),
}

/// A page of rows converted from a service response.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub rows: Vec<Arc<Row>>,
    pub total: usize,
}

/// A request decided by [`JobsTable::begin_pass`]. It owns everything it
/// needs, so the table can keep taking intents while it runs.
pub struct PendingFetch {
    request_id: u64,
    plan: FetchPlan,
    snapshot: QueryKey,
    cancel: CancellationToken,
    get_jobs: Arc<dyn GetJobsService>,
    group_jobs: Arc<dyn GroupJobsService>,
}

pub struct CompletedFetch {
    request_id: u64,
    plan: FetchPlan,
    snapshot: QueryKey,
    cancel: CancellationToken,
    result: Result<FetchedPage>,
}

impl PendingFetch {
    pub fn plan(&self) -> &FetchPlan {
        &self.plan
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn run(self) -> CompletedFetch {
        let result = tokio::select! {
            _ = self.cancel.cancelled() => Err(LookoutError::Cancelled),
            result = self.fetch() => result,
        };
        CompletedFetch {
            request_id: self.request_id,
            plan: self.plan,
            snapshot: self.snapshot,
            cancel: self.cancel,
            result,
        }
    }

    async fn fetch(&self) -> Result<FetchedPage> {
        let plan = &self.plan;
        let parent = plan.parent.as_ref().map(|info| &info.row_id);
        match &plan.kind {
            FetchKind::Jobs => {
                let resp = self
                    .get_jobs
                    .get_jobs(&plan.filters, &plan.order, plan.skip, plan.take, &self.cancel)
                    .await?;
                Ok(FetchedPage {
                    rows: jobs_to_rows(resp.jobs, parent),
                    total: resp.total_jobs,
                })
            }
            FetchKind::Groups { field, aggregates } => {
                let resp = self
                    .group_jobs
                    .group_jobs(
                        &plan.filters,
                        &plan.order,
                        field,
                        aggregates,
                        plan.skip,
                        plan.take,
                        &self.cancel,
                    )
                    .await?;
                Ok(FetchedPage {
                    rows: groups_to_rows(resp.groups, parent, field),
                    total: resp.total_groups,
                })
            }
        }
    }
}

impl CompletedFetch {
    pub fn plan(&self) -> &FetchPlan {
        &self.plan
    }

    pub fn result(&self) -> &Result<FetchedPage> {
        &self.result
    }
}

/// A lazily loaded, grouped view over the jobs known to the query services.
///
/// Intents (`set_grouping`, `toggle_expanded`, `load_more`, ...) only change
/// local state. A pass ([`reconcile`](Self::reconcile), or the
/// [`begin_pass`](Self::begin_pass) / [`PendingFetch::run`] /
/// [`complete`](Self::complete) triple) compares that state with the state
/// the previous pass saw and issues at most one fetch to catch up.
pub struct JobsTable {
    get_jobs: Arc<dyn GetJobsService>,
    group_jobs: Arc<dyn GroupJobsService>,
    page_size_options: Vec<usize>,
    columns: Vec<ColumnSpec>,

    state: TableState,
    /// State as seen by the last pass; `None` before the first.
    synced: Option<TableState>,
    /// Expanded row whose children were dropped by a root rebuild.
    refresh: Option<RowId>,
    /// Cancelled whenever the root page is invalidated.
    epoch: CancellationToken,
    next_request_id: u64,

    forest: Forest,
    selection: Selection,
    total_row_count: usize,
    page_count: usize,
    loading: bool,
    last_error: Option<String>,
}

impl JobsTable {
    pub fn new(
        config: TableConfig,
        get_jobs: Arc<dyn GetJobsService>,
        group_jobs: Arc<dyn GroupJobsService>,
    ) -> Self {
        let state = TableState::new(
            config.grouping,
            Pagination::new(0, config.page_size.max(1)),
            config.order,
        );
        let mut table = Self {
            get_jobs,
            group_jobs,
            page_size_options: config.page_size_options,
            columns: config.columns,
            state,
            synced: None,
            refresh: None,
            epoch: CancellationToken::new(),
            next_request_id: 0,
            forest: Vec::new(),
            selection: Selection::new(),
            total_row_count: 0,
            page_count: 0,
            loading: true,
            last_error: None,
        };
        let grouping = table.state.grouping.clone();
        table.display_grouped_columns(&grouping);
        table
    }

    /// A table whose two services are the same object.
    pub fn with_service<S>(config: TableConfig, service: Arc<S>) -> Self
    where
        S: GetJobsService + GroupJobsService + 'static,
    {
        Self::new(config, service.clone(), service)
    }

    // === Intents ===

    /// Replace the grouping sequence. Expansion and selection are reset and
    /// every grouped column becomes displayed. Setting the current grouping
    /// again does nothing.
    pub fn set_grouping(&mut self, grouping: Vec<String>) {
        if grouping == self.state.grouping {
            return;
        }
        self.selection.clear();
        self.state.expanded.clear();
        self.refresh = None;
        self.display_grouped_columns(&grouping);
        tracing::info!(grouping = ?grouping, "Grouping changed");
        self.state.grouping = grouping;
        self.invalidate_in_flight();
    }

    /// Set the dimension at `index`, appending when `index` equals the
    /// current grouping length.
    pub fn set_grouped_field(&mut self, field: &str, index: usize) -> Result<()> {
        let mut grouping = self.state.grouping.clone();
        if index > grouping.len() {
            return Err(LookoutError::InvalidGrouping(format!(
                "index {index} is past the end of {grouping:?}"
            )));
        }
        if let Some(existing) = grouping.iter().position(|f| f == field) {
            if existing != index {
                return Err(LookoutError::InvalidGrouping(format!(
                    "{field} is already grouped at index {existing} in {grouping:?}"
                )));
            }
        }
        if index == grouping.len() {
            grouping.push(field.to_string());
        } else {
            grouping[index] = field.to_string();
        }
        self.set_grouping(grouping);
        Ok(())
    }

    pub fn delete_grouped_field(&mut self, index: usize) -> Result<()> {
        let mut grouping = self.state.grouping.clone();
        if index >= grouping.len() {
            return Err(LookoutError::InvalidGrouping(format!(
                "no grouped field at index {index} in {grouping:?}"
            )));
        }
        grouping.remove(index);
        self.set_grouping(grouping);
        Ok(())
    }

    /// Change the root page. Drill-down and selection do not survive a page change.
    pub fn set_pagination(&mut self, pagination: Pagination) -> Result<()> {
        if pagination.page_size == 0 {
            return Err(LookoutError::InvalidPagination(
                "page size must be positive".to_string(),
            ));
        }
        if pagination == self.state.pagination {
            return Ok(());
        }
        self.selection.clear();
        self.state.expanded.clear();
        self.refresh = None;
        self.state.pagination = pagination;
        self.invalidate_in_flight();
        Ok(())
    }

    pub fn set_page_index(&mut self, page_index: usize) -> Result<()> {
        let page_size = self.state.pagination.page_size;
        self.set_pagination(Pagination::new(page_index, page_size))
    }

    /// Change the page size and go back to the first page.
    pub fn set_page_size(&mut self, page_size: usize) -> Result<()> {
        if !self.page_size_options.is_empty() && !self.page_size_options.contains(&page_size) {
            return Err(LookoutError::InvalidPagination(format!(
                "page size {page_size} is not one of {:?}",
                self.page_size_options
            )));
        }
        self.set_pagination(Pagination::new(0, page_size))
    }

    pub fn set_column_filters(&mut self, filters: Vec<ColumnFilter>) {
        if filters == self.state.column_filters {
            return;
        }
        self.reset_for_requery();
        self.state.column_filters = filters;
    }

    pub fn set_sort(&mut self, order: JobOrder) {
        if order == self.state.order {
            return;
        }
        self.reset_for_requery();
        self.state.order = order;
    }

    /// Replace the whole expanded set. Only one newly expanded row is loaded
    /// per pass.
    pub fn set_expanded(&mut self, expanded: BTreeSet<RowId>) {
        self.state.expanded = expanded;
    }

    /// Expand or collapse one row. Collapsing also collapses its descendants.
    pub fn toggle_expanded(&mut self, row_id: &RowId) -> bool {
        if self.state.expanded.remove(row_id) {
            let prefix = format!("{row_id}>");
            self.state
                .expanded
                .retain(|id| !id.as_str().starts_with(&prefix));
            false
        } else {
            self.state.expanded.insert(row_id.clone());
            true
        }
    }

    /// Ask for the next page of children of an expanded group.
    pub fn load_more(&mut self, row_id: &RowId) -> Result<()> {
        let row = find_row(&self.forest, row_id)
            .ok_or_else(|| LookoutError::RowNotFound(row_id.clone()))?;
        let group = row
            .as_group()
            .ok_or_else(|| LookoutError::NotAGroup(row_id.clone()))?;
        self.load_more_at(row_id, group.loaded_sub_rows());
        Ok(())
    }

    pub fn load_more_at(&mut self, row_id: &RowId, skip: usize) {
        self.state.load_more = Some(LoadMoreRequest {
            row_id: row_id.clone(),
            skip,
        });
    }

    pub fn toggle_selected(&mut self, row_id: &RowId) -> bool {
        self.selection.toggle(row_id)
    }

    pub fn set_column_displayed(&mut self, key: &str, displayed: bool) -> Result<()> {
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.key == key)
            .ok_or_else(|| LookoutError::UnknownColumn(key.to_string()))?;
        column.selected = displayed;
        Ok(())
    }

    /// Add a column for an annotation key unless a column with that key exists.
    pub fn add_annotation_column(&mut self, key: &str) {
        if !self.columns.iter().any(|c| c.key == key) {
            self.columns.push(ColumnSpec::annotation(key));
        }
    }

    // === Passes ===

    /// Decide what, if anything, must be fetched for the current state and
    /// record that state as synced.
    pub fn begin_pass(&mut self) -> PassStart {
        let aggregates = self.aggregate_fields();
        let refresh = self.refresh.take();
        let decision = plan_pass(self.synced.as_ref(), &self.state, refresh.as_ref(), &aggregates);

        self.state.load_more = None;
        self.synced = Some(self.state.clone());

        match decision {
            Decision::Unchanged => PassStart::Done(PassOutcome::Unchanged),
            Decision::CollapseOnly => PassStart::Done(PassOutcome::CollapseOnly),
            Decision::Skip => PassStart::Done(PassOutcome::Skipped),
            Decision::Fetch(plan) => {
                self.next_request_id += 1;
                tracing::info!(
                    request_id = self.next_request_id,
                    parent = ?plan.parent.as_ref().map(|info| info.row_id.as_str()),
                    kind = ?plan.kind,
                    skip = plan.skip,
                    take = plan.take,
                    append = plan.append,
                    "Fetching rows"
                );
                PassStart::Fetch(PendingFetch {
                    request_id: self.next_request_id,
                    plan,
                    snapshot: self.state.query_key(),
                    cancel: self.epoch.child_token(),
                    get_jobs: Arc::clone(&self.get_jobs),
                    group_jobs: Arc::clone(&self.group_jobs),
                })
            }
        }
    }

    /// Merge a finished fetch, unless the state it was issued for is gone.
    pub fn complete(&mut self, done: CompletedFetch) -> PassOutcome {
        let current = self.state.query_key();
        if done.cancel.is_cancelled() || done.snapshot != current {
            tracing::debug!(request_id = done.request_id, "Discarding stale fetch result");
            if done.snapshot == current {
                // Cancelled by a change that was since undone
                self.replan(&done.plan);
            }
            return PassOutcome::Discarded;
        }

        if done.plan.append && !self.appends_at_end(&done.plan) {
            tracing::debug!(
                request_id = done.request_id,
                skip = done.plan.skip,
                "Discarding page already loaded by an earlier request"
            );
            return PassOutcome::Discarded;
        }

        let page = match done.result {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(request_id = done.request_id, error = %e, "Failed to fetch rows");
                return self.fail(e);
            }
        };

        let location = done.plan.location().to_vec();
        let new_ids: Vec<RowId> = page.rows.iter().map(|row| row.row_id().clone()).collect();
        let merged = match merge_sub_rows(&self.forest, page.rows, &location, done.plan.append) {
            Ok(merged) => merged,
            Err(e) => {
                tracing::warn!(request_id = done.request_id, error = %e, "Failed to merge rows");
                return self.fail(e);
            }
        };

        let parent = done.plan.parent.as_ref().map(|info| info.row_id.clone());
        match &parent {
            None => {
                self.forest = merged.forest;
                self.total_row_count = page.total;
                self.page_count = page.total.div_ceil(self.state.pagination.page_size);
                self.schedule_refresh();
            }
            Some(parent_id) => {
                let (forest, _) = match set_sub_row_count(&merged.forest, &location, page.total) {
                    Ok(updated) => updated,
                    Err(e) => return self.fail(e),
                };
                self.forest = forest;
                self.selection.on_rows_merged(parent_id, &new_ids);
            }
        }

        self.loading = false;
        self.last_error = None;
        tracing::debug!(
            request_id = done.request_id,
            rows = new_ids.len(),
            total = page.total,
            "Merged rows"
        );
        PassOutcome::Merged {
            parent,
            rows: new_ids.len(),
            total: page.total,
        }
    }

    /// One full pass: decide, fetch, merge.
    pub async fn reconcile(&mut self) -> PassOutcome {
        match self.begin_pass() {
            PassStart::Done(outcome) => outcome,
            PassStart::Fetch(pending) => {
                let done = pending.run().await;
                self.complete(done)
            }
        }
    }

    /// Run passes until one has nothing left to fetch.
    pub async fn sync(&mut self) -> Vec<PassOutcome> {
        let mut outcomes = Vec::new();
        for _ in 0..MAX_SYNC_PASSES {
            let outcome = self.reconcile().await;
            let settled = !matches!(outcome, PassOutcome::Merged { .. })
                && self.refresh.is_none()
                && self.synced.is_some();
            outcomes.push(outcome);
            if settled {
                break;
            }
        }
        outcomes
    }

    // === Derived state ===

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn visible_rows(&self) -> Vec<VisibleRow> {
        visible_rows(&self.forest, &self.state.expanded)
    }

    pub fn find_row(&self, row_id: &RowId) -> Option<Arc<Row>> {
        find_row(&self.forest, row_id)
    }

    pub fn state(&self) -> &TableState {
        &self.state
    }

    pub fn grouping(&self) -> &[String] {
        &self.state.grouping
    }

    pub fn expanded(&self) -> &BTreeSet<RowId> {
        &self.state.expanded
    }

    pub fn pagination(&self) -> Pagination {
        self.state.pagination
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selected_jobs(&self) -> Vec<String> {
        self.selection.selected_jobs()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn total_row_count(&self) -> usize {
        self.total_row_count
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Grouped columns in grouping order, then the other displayed columns.
    pub fn visible_columns(&self) -> Vec<&ColumnSpec> {
        let grouped = self
            .state
            .grouping
            .iter()
            .filter_map(|key| self.columns.iter().find(|c| &c.key == key));
        let rest = self
            .columns
            .iter()
            .filter(|c| c.selected && !self.state.grouping.contains(&c.key));
        grouped.chain(rest).collect()
    }

    // === Internals ===

    fn aggregate_fields(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.groupable)
            .map(|c| c.key.clone())
            .collect()
    }

    fn display_grouped_columns(&mut self, grouping: &[String]) {
        for key in grouping {
            self.add_annotation_column(key);
            if let Some(column) = self.columns.iter_mut().find(|c| &c.key == key) {
                column.selected = true;
            }
        }
    }

    /// Filter and sort changes rebuild the tree from the first page. Several
    /// expanded rows cannot be brought back one fetch at a time, so they are
    /// all collapsed; a single one is kept and reloaded after the rebuild.
    fn reset_for_requery(&mut self) {
        if self.state.expanded.len() > 1 {
            tracing::info!(
                expanded = self.state.expanded.len(),
                "Collapsing all rows for new query"
            );
            self.state.expanded.clear();
        }
        self.refresh = None;
        self.state.pagination.page_index = 0;
        self.invalidate_in_flight();
    }

    /// Make the next pass fetch again what a discarded request was loading.
    fn replan(&mut self, plan: &FetchPlan) {
        match &plan.parent {
            None => self.synced = None,
            Some(info) if !plan.append && self.state.expanded.contains(&info.row_id) => {
                self.refresh = Some(info.row_id.clone());
            }
            Some(_) => {}
        }
    }

    /// An appended page must start right after the children already loaded,
    /// otherwise an overlapping request has loaded it first.
    fn appends_at_end(&self, plan: &FetchPlan) -> bool {
        let Some(info) = &plan.parent else {
            return true;
        };
        match find_row(&self.forest, &info.row_id) {
            Some(row) => row
                .as_group()
                .map_or(true, |group| group.loaded_sub_rows() == plan.skip),
            None => true,
        }
    }

    fn invalidate_in_flight(&mut self) {
        self.epoch.cancel();
        self.epoch = CancellationToken::new();
    }

    /// After a root rebuild, keep only an expanded row that still exists and
    /// queue its children for the next pass.
    fn schedule_refresh(&mut self) {
        if self.state.expanded.is_empty() {
            return;
        }
        let survivors: Vec<RowId> = self
            .state
            .expanded
            .iter()
            .filter(|id| find_row(&self.forest, id).is_some_and(|row| row.is_group()))
            .cloned()
            .collect();
        if survivors.len() > 1 {
            tracing::warn!(
                expanded = survivors.len(),
                "Only one expanded row can be reloaded, collapsing the rest"
            );
        }
        self.state.expanded = survivors.iter().take(1).cloned().collect();
        self.refresh = survivors.into_iter().next();
        if let Some(synced) = self.synced.as_mut() {
            synced.expanded = self.state.expanded.clone();
        }
    }

    fn fail(&mut self, error: LookoutError) -> PassOutcome {
        self.loading = false;
        self.last_error = Some(error.to_string());
        PassOutcome::Failed(error)
    }
}
