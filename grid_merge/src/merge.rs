use crate::error::{EmptyOverlapError, PipelineError};
use crate::models::{
    hour_floor, Granularity, MergedDataset, MergedRow, NormalizedRecord, SourceDataset, SourceKind,
    ValidRange,
};
use chrono::{Duration, NaiveDateTime};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Expand a daily dataset to hourly records by forward fill.
///
/// Each value holds from its own timestamp until the next one; the last value
/// covers the 24 hours of its day.
pub fn upsample_daily(dataset: &SourceDataset) -> Result<SourceDataset, PipelineError> {
    if dataset.granularity() == Granularity::Hourly {
        return Ok(dataset.clone());
    }

    let records = dataset.records();
    let mut hourly = Vec::new();
    for (i, record) in records.iter().enumerate() {
        let until = records
            .get(i + 1)
            .map(|next| next.timestamp)
            .unwrap_or(record.timestamp + Duration::hours(24));
        let mut ts = hour_floor(record.timestamp);
        while ts < until {
            hourly.push(NormalizedRecord {
                timestamp: ts,
                iso: record.iso.clone(),
                fields: record.fields.clone(),
            });
            ts += Duration::hours(1);
        }
    }

    SourceDataset::new(
        dataset.kind(),
        Granularity::Hourly,
        dataset.iso(),
        dataset.columns().to_vec(),
        hourly,
    )
}

/// `[max(first), min(last) + 1h)` across every dataset.
pub fn valid_range(datasets: &[&SourceDataset]) -> Result<ValidRange, EmptyOverlapError> {
    if datasets.is_empty() {
        return Err(EmptyOverlapError {
            detail: "no datasets to merge".to_string(),
        });
    }

    let mut start = NaiveDateTime::MIN;
    let mut last = NaiveDateTime::MAX;
    for dataset in datasets {
        let (Some(first_ts), Some(last_ts)) = (dataset.first_timestamp(), dataset.last_timestamp()) else {
            return Err(EmptyOverlapError {
                detail: format!("{} has no records", dataset.kind()),
            });
        };
        start = start.max(first_ts);
        last = last.min(last_ts);
    }

    let end = last + Duration::hours(1);
    if start >= end {
        return Err(EmptyOverlapError {
            detail: format!("latest start {} is not before earliest end {}", start, end),
        });
    }
    Ok(ValidRange { start, end })
}

fn check_collisions(datasets: &[Cow<'_, SourceDataset>]) -> Result<(), PipelineError> {
    let mut owners: BTreeMap<&str, SourceKind> = BTreeMap::new();
    for dataset in datasets {
        for column in dataset.columns() {
            if let Some(first) = owners.insert(column.as_str(), dataset.kind()) {
                return Err(PipelineError::ColumnCollision {
                    column: column.clone(),
                    first,
                    second: dataset.kind(),
                });
            }
        }
    }
    Ok(())
}

fn values_of(dataset: &SourceDataset, record: &NormalizedRecord) -> Vec<Option<f64>> {
    dataset.columns().iter().map(|c| record.field(c)).collect()
}

/// Inner-join every dataset on timestamp over their common range.
///
/// Daily datasets are forward filled to hourly first. Datasets are joined in
/// source order whatever order they are passed in.
pub fn merge(datasets: &[SourceDataset], iso: &str) -> Result<MergedDataset, PipelineError> {
    let mut aligned: Vec<Cow<'_, SourceDataset>> = Vec::with_capacity(datasets.len());
    for dataset in datasets {
        aligned.push(match dataset.granularity() {
            Granularity::Hourly => Cow::Borrowed(dataset),
            Granularity::Daily => Cow::Owned(upsample_daily(dataset)?),
        });
    }
    aligned.sort_by_key(|d| d.kind());

    let refs: Vec<&SourceDataset> = aligned.iter().map(|d| d.as_ref()).collect();
    let range = valid_range(&refs)?;
    check_collisions(&aligned)?;

    let mut joined: BTreeMap<NaiveDateTime, Vec<Option<f64>>> = BTreeMap::new();
    for (i, dataset) in refs.iter().enumerate() {
        let in_range = dataset
            .records()
            .iter()
            .filter(|r| range.contains(r.timestamp));

        if i == 0 {
            joined = in_range.map(|r| (r.timestamp, values_of(dataset, r))).collect();
            continue;
        }

        let lookup: BTreeMap<NaiveDateTime, &NormalizedRecord> =
            in_range.map(|r| (r.timestamp, r)).collect();
        joined.retain(|ts, _| lookup.contains_key(ts));
        for (ts, values) in joined.iter_mut() {
            if let Some(record) = lookup.get(ts) {
                values.extend(values_of(dataset, record));
            }
        }
    }

    let columns: Vec<String> = refs.iter().flat_map(|d| d.columns().iter().cloned()).collect();
    let rows: Vec<MergedRow> = joined
        .into_iter()
        .map(|(timestamp, values)| MergedRow {
            timestamp,
            values,
            features: None,
        })
        .collect();

    let gap_hours = usize::try_from(range.hours()).unwrap_or(0).saturating_sub(rows.len());
    if gap_hours > 0 {
        log::warn!(
            "{} of {} hours between {} and {} are missing from at least one source",
            gap_hours,
            range.hours(),
            range.start,
            range.end
        );
    }
    log::info!(
        "merged {} sources into {} hourly rows ({} columns)",
        refs.len(),
        rows.len(),
        columns.len()
    );

    Ok(MergedDataset {
        iso: iso.to_string(),
        columns,
        rows,
        range,
        gap_hours,
    })
}
