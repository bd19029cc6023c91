//! Long-to-wide reshaping for sources with a categorical dimension.

use crate::categories::Vocabulary;
use crate::config::UnknownCategoryPolicy;
use crate::error::AggregationAmbiguityError;
use crate::models::{NormalizedRecord, SourceKind};
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet};

pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// How duplicate `(timestamp, category)` values of one metric combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Mean of the non-null values.
    Mean,
    /// Sum of the non-null values.
    Sum,
    /// No rule: a duplicate is an error.
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PivotMetric {
    pub name: &'static str,
    pub aggregation: Aggregation,
}

impl PivotMetric {
    pub const fn new(name: &'static str, aggregation: Aggregation) -> Self {
        Self { name, aggregation }
    }
}

/// One categorical observation; `values` follow the metric order.
#[derive(Debug, Clone, PartialEq)]
pub struct LongRecord {
    pub timestamp: NaiveDateTime,
    pub category: String,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PivotTable {
    pub columns: Vec<String>,
    pub rows: Vec<(NaiveDateTime, Vec<Option<f64>>)>,
    /// Records per label outside the vocabulary.
    pub unknown: BTreeMap<String, usize>,
}

impl PivotTable {
    pub fn into_records(self, iso: &str) -> Vec<NormalizedRecord> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|(timestamp, values)| NormalizedRecord {
                timestamp,
                iso: iso.to_string(),
                fields: columns.iter().cloned().zip(values).collect(),
            })
            .collect()
    }
}

pub fn column_name(category: &str, metric: &str) -> String {
    format!("{} {}", category, metric)
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    sum: f64,
    count: usize,
}

impl Accumulator {
    fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn finish(&self, aggregation: Aggregation) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        match aggregation {
            Aggregation::Mean => Some(self.sum / self.count as f64),
            Aggregation::Sum | Aggregation::Reject => Some(self.sum),
        }
    }
}

pub struct Pivot<'a> {
    dataset: SourceKind,
    metrics: &'a [PivotMetric],
    vocabulary: &'a Vocabulary,
    policy: UnknownCategoryPolicy,
}

impl<'a> Pivot<'a> {
    pub fn new(
        dataset: SourceKind,
        metrics: &'a [PivotMetric],
        vocabulary: &'a Vocabulary,
        policy: UnknownCategoryPolicy,
    ) -> Self {
        Self {
            dataset,
            metrics,
            vocabulary,
            policy,
        }
    }

    /// Every output column name, in output order.
    pub fn columns(&self, extra: &BTreeSet<String>) -> Vec<String> {
        let mut categories: Vec<&str> = self.vocabulary.labels().iter().map(String::as_str).collect();
        categories.extend(extra.iter().map(String::as_str));
        if self.policy == UnknownCategoryPolicy::Bucket {
            categories.push(UNKNOWN_CATEGORY);
        }

        categories
            .iter()
            .flat_map(|category| self.metrics.iter().map(move |m| column_name(category, m.name)))
            .collect()
    }

    pub fn run<I>(&self, records: I) -> Result<PivotTable, AggregationAmbiguityError>
    where
        I: IntoIterator<Item = LongRecord>,
    {
        let rejects_duplicates = self
            .metrics
            .iter()
            .find(|m| m.aggregation == Aggregation::Reject);

        let mut unknown: BTreeMap<String, usize> = BTreeMap::new();
        let mut extra: BTreeSet<String> = BTreeSet::new();
        let mut cells: BTreeMap<(NaiveDateTime, String), Vec<Accumulator>> = BTreeMap::new();

        for record in records {
            let category = if self.vocabulary.contains(&record.category) {
                record.category
            } else {
                *unknown.entry(record.category.clone()).or_insert(0) += 1;
                match self.policy {
                    UnknownCategoryPolicy::PassThrough => {
                        extra.insert(record.category.clone());
                        record.category
                    }
                    UnknownCategoryPolicy::Drop => continue,
                    UnknownCategoryPolicy::Bucket => UNKNOWN_CATEGORY.to_string(),
                }
            };

            let key = (record.timestamp, category);
            if let Some(metric) = rejects_duplicates {
                if cells.contains_key(&key) {
                    return Err(AggregationAmbiguityError {
                        dataset: self.dataset,
                        timestamp: key.0,
                        category: key.1,
                        metric: metric.name,
                    });
                }
            }

            let accumulators = cells
                .entry(key)
                .or_insert_with(|| vec![Accumulator::default(); self.metrics.len()]);
            for (acc, value) in accumulators.iter_mut().zip(record.values) {
                acc.push(value);
            }
        }

        for (label, count) in &unknown {
            log::warn!(
                "{}: {} records with unknown category '{}' ({:?})",
                self.dataset,
                count,
                label,
                self.policy
            );
        }

        let columns = self.columns(&extra);
        let index: BTreeMap<String, usize> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();

        let mut rows: Vec<(NaiveDateTime, Vec<Option<f64>>)> = Vec::new();
        for ((timestamp, category), accumulators) in cells {
            if rows.last().map(|(ts, _)| *ts) != Some(timestamp) {
                rows.push((timestamp, vec![None; columns.len()]));
            }
            let Some((_, row)) = rows.last_mut() else {
                continue;
            };
            for (metric, acc) in self.metrics.iter().zip(&accumulators) {
                if let Some(&col) = index.get(&column_name(&category, metric.name)) {
                    row[col] = acc.finish(metric.aggregation);
                }
            }
        }

        Ok(PivotTable {
            columns,
            rows,
            unknown,
        })
    }
}
