//! The per-source run loop shared by every adapter.
//!
//! An adapter lists the remote reports it needs for a run, normalizes each
//! fetched table into items, and finally assembles the items of every
//! successful period into datasets. The loop isolates failures per period:
//! a report that cannot be fetched, or whose shape matches no known layout,
//! only removes that period and is recorded in the [`IngestReport`].

use crate::config::PipelineConfig;
use crate::error::{PipelineError, SchemaMismatchError};
use crate::fetch::{CancelFlag, Fetch};
use crate::models::{NormalizedRecord, Period, SourceDataset};
use crate::pivot::LongRecord;
use crate::raw_table::RawPeriodTable;
use chrono::NaiveDateTime;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt::Debug;

/// One remote report to fetch for one period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodRequest<V> {
    pub period: Period,
    pub address: String,
    /// Which report or layout the address refers to.
    pub variant: V,
}

pub trait Timestamped {
    fn timestamp(&self) -> NaiveDateTime;

    /// Whether a single report may hold at most one such item per hour.
    fn one_per_hour(&self) -> bool {
        false
    }
}

impl Timestamped for NormalizedRecord {
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    fn one_per_hour(&self) -> bool {
        true
    }
}

impl Timestamped for LongRecord {
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
}

pub trait SourceAdapter: Sync {
    type Variant: Copy + Send + Sync + Debug;
    type Item: Send + Timestamped;

    fn name(&self) -> &'static str;

    fn requests(&self, config: &PipelineConfig) -> Vec<PeriodRequest<Self::Variant>>;

    fn normalize(
        &self,
        request: &PeriodRequest<Self::Variant>,
        table: &RawPeriodTable,
    ) -> Result<Vec<Self::Item>, SchemaMismatchError>;

    fn assemble(&self, items: Vec<Self::Item>) -> Result<Vec<SourceDataset>, PipelineError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PeriodStatus {
    Ingested { records: usize },
    FetchFailed { reason: String },
    SchemaMismatch { reason: String },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodOutcome {
    pub period: Period,
    pub address: String,
    pub status: PeriodStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub adapter: String,
    pub outcomes: Vec<PeriodOutcome>,
}

impl IngestReport {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn ingested(&self) -> usize {
        self.count(|s| matches!(s, PeriodStatus::Ingested { .. }))
    }

    pub fn fetch_failures(&self) -> usize {
        self.count(|s| matches!(s, PeriodStatus::FetchFailed { .. }))
    }

    pub fn schema_mismatches(&self) -> usize {
        self.count(|s| matches!(s, PeriodStatus::SchemaMismatch { .. }))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|s| matches!(s, PeriodStatus::Cancelled))
    }

    /// Outcomes of every period that contributed nothing.
    pub fn skipped(&self) -> impl Iterator<Item = &PeriodOutcome> {
        self.outcomes
            .iter()
            .filter(|o| !matches!(o.status, PeriodStatus::Ingested { .. }))
    }

    fn count(&self, pred: impl Fn(&PeriodStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

fn progress_bar(len: usize, name: &'static str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({msg})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.set_message(name);
    pb
}

fn attempt<A, F>(
    adapter: &A,
    request: &PeriodRequest<A::Variant>,
    fetcher: &F,
    cancel: &CancelFlag,
) -> (PeriodOutcome, Vec<A::Item>)
where
    A: SourceAdapter,
    F: Fetch,
{
    let outcome = |status| PeriodOutcome {
        period: request.period,
        address: request.address.clone(),
        status,
    };

    if cancel.is_cancelled() {
        return (outcome(PeriodStatus::Cancelled), Vec::new());
    }

    let table = match fetcher.fetch(&request.address) {
        Ok(table) => table,
        Err(e) => {
            log::warn!("{}: skipping {}, report unavailable: {}", adapter.name(), request.period, e);
            return (
                outcome(PeriodStatus::FetchFailed {
                    reason: e.to_string(),
                }),
                Vec::new(),
            );
        }
    };

    let normalized = adapter
        .normalize(request, &table)
        .and_then(|items| check_repeated_hours(adapter.name(), items));

    match normalized {
        Ok(mut items) => {
            let before = items.len();
            items.retain(|item| request.period.contains(item.timestamp()));
            if items.len() < before {
                log::debug!(
                    "{}: {} records of {} fall outside the period",
                    adapter.name(),
                    before - items.len(),
                    request.address
                );
            }
            let records = items.len();
            (outcome(PeriodStatus::Ingested { records }), items)
        }
        Err(e) => {
            log::warn!(
                "{}: skipping {}, table shape not recognised (upstream format change?): {}",
                adapter.name(),
                request.period,
                e
            );
            (
                outcome(PeriodStatus::SchemaMismatch {
                    reason: e.to_string(),
                }),
                Vec::new(),
            )
        }
    }
}

/// A report listing the same hour twice is treated as unreadable.
fn check_repeated_hours<T: Timestamped>(
    layout: &'static str,
    items: Vec<T>,
) -> Result<Vec<T>, SchemaMismatchError> {
    let mut seen = HashSet::new();
    for item in items.iter().filter(|item| item.one_per_hour()) {
        if !seen.insert(item.timestamp()) {
            return Err(SchemaMismatchError::new(
                layout,
                format!("hour {} appears more than once", item.timestamp()),
            ));
        }
    }
    Ok(items)
}

/// Fetch and normalize every period of one adapter, then assemble its datasets.
pub fn run_adapter<A, F>(
    adapter: &A,
    config: &PipelineConfig,
    fetcher: &F,
    cancel: &CancelFlag,
) -> Result<(Vec<SourceDataset>, IngestReport), PipelineError>
where
    A: SourceAdapter,
    F: Fetch,
{
    let requests = adapter.requests(config);
    let pb = progress_bar(requests.len(), adapter.name(), config.show_progress);

    let step = |request: &PeriodRequest<A::Variant>| {
        let result = attempt(adapter, request, fetcher, cancel);
        pb.inc(1);
        result
    };

    let results: Vec<(PeriodOutcome, Vec<A::Item>)> = if config.parallel_fetch {
        requests.par_iter().map(step).collect()
    } else {
        requests.iter().map(step).collect()
    };
    pb.finish_and_clear();

    let mut outcomes = Vec::with_capacity(results.len());
    let mut items = Vec::new();
    for (outcome, mut period_items) in results {
        outcomes.push(outcome);
        items.append(&mut period_items);
    }

    let report = IngestReport {
        adapter: adapter.name().to_string(),
        outcomes,
    };
    if report.cancelled() > 0 {
        log::warn!("{}: {} periods not fetched after cancellation", adapter.name(), report.cancelled());
    }

    let datasets = adapter.assemble(items)?;
    log::info!(
        "{}: ingested {}/{} periods ({} fetch misses, {} schema mismatches), {} records",
        adapter.name(),
        report.ingested(),
        report.attempted(),
        report.fetch_failures(),
        report.schema_mismatches(),
        datasets.iter().map(SourceDataset::len).sum::<usize>()
    );

    Ok((datasets, report))
}
