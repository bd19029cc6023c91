use crate::error::PipelineError;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Load,
    Wind,
    Lmp,
    GenMix,
    DaOffers,
    GasPrice,
}

impl SourceKind {
    pub const ALL: [SourceKind; 6] = [
        SourceKind::Load,
        SourceKind::Wind,
        SourceKind::Lmp,
        SourceKind::GenMix,
        SourceKind::DaOffers,
        SourceKind::GasPrice,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Load => "load",
            SourceKind::Wind => "wind",
            SourceKind::Lmp => "lmp",
            SourceKind::GenMix => "gen_mix",
            SourceKind::DaOffers => "da_offers",
            SourceKind::GasPrice => "gas_price",
        }
    }

    /// Stem of the file the dataset is persisted under.
    pub fn file_stem(&self) -> &'static str {
        match self {
            SourceKind::Load => "miso_load",
            SourceKind::Wind => "miso_wind",
            SourceKind::Lmp => "miso_lmp",
            SourceKind::GenMix => "miso_gen_mix",
            SourceKind::DaOffers => "miso_da_offers",
            SourceKind::GasPrice => "miso_eia_hh",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        SourceKind::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = SourceKind::ALL.iter().map(|k| k.name()).collect();
                format!("unknown source '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    Hourly,
    Daily,
}

/// A unit of remote reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Period {
    Day(NaiveDate),
    Year(i32),
    /// The full published history of a source, through `end`.
    History { end: NaiveDate },
}

impl Period {
    /// One `Day` per calendar day in `[start, end]`.
    pub fn days(start: NaiveDate, end: NaiveDate) -> Vec<Period> {
        start
            .iter_days()
            .take_while(|day| *day <= end)
            .map(Period::Day)
            .collect()
    }

    /// One `Year` per calendar year touched by `[start, end]`.
    pub fn years(start: NaiveDate, end: NaiveDate) -> Vec<Period> {
        if start > end {
            return Vec::new();
        }
        (start.year()..=end.year()).map(Period::Year).collect()
    }

    pub fn first_day(&self) -> NaiveDate {
        match self {
            Period::Day(day) => *day,
            Period::Year(year) => jan_first(*year),
            Period::History { .. } => NaiveDate::MIN,
        }
    }

    /// Natural span of the period as a half-open interval.
    pub fn span(&self) -> (NaiveDateTime, NaiveDateTime) {
        match self {
            Period::Day(day) => (midnight(*day), midnight(*day) + Duration::days(1)),
            Period::Year(year) => (midnight(jan_first(*year)), midnight(jan_first(year + 1))),
            Period::History { end } => (NaiveDateTime::MIN, midnight(*end) + Duration::days(1)),
        }
    }

    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        let (start, end) = self.span();
        timestamp >= start && timestamp < end
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Day(day) => write!(f, "{}", day),
            Period::Year(year) => write!(f, "{}", year),
            Period::History { end } => write!(f, "history through {}", end),
        }
    }
}

pub fn midnight(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::MIN)
}

fn jan_first(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or_default()
}

/// Floor a timestamp to the start of its hour.
pub fn hour_floor(timestamp: NaiveDateTime) -> NaiveDateTime {
    timestamp
        - Duration::minutes(timestamp.minute() as i64)
        - Duration::seconds(timestamp.second() as i64)
        - Duration::nanoseconds(timestamp.nanosecond() as i64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub timestamp: NaiveDateTime,
    pub iso: String,
    pub fields: BTreeMap<String, Option<f64>>,
}

impl NormalizedRecord {
    pub fn new(timestamp: NaiveDateTime, iso: impl Into<String>) -> Self {
        Self {
            timestamp,
            iso: iso.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Option<f64>) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied().flatten()
    }
}

/// All normalized records of one source, sorted by timestamp with no duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDataset {
    kind: SourceKind,
    granularity: Granularity,
    iso: String,
    columns: Vec<String>,
    records: Vec<NormalizedRecord>,
}

impl SourceDataset {
    pub fn new(
        kind: SourceKind,
        granularity: Granularity,
        iso: impl Into<String>,
        columns: Vec<String>,
        mut records: Vec<NormalizedRecord>,
    ) -> Result<Self, PipelineError> {
        records.sort_by_key(|record| record.timestamp);

        if let Some(pair) = records.windows(2).find(|pair| pair[0].timestamp == pair[1].timestamp) {
            return Err(PipelineError::DuplicateTimestamp {
                dataset: kind,
                timestamp: pair[0].timestamp,
            });
        }

        Ok(Self {
            kind,
            granularity,
            iso: iso.into(),
            columns,
            records,
        })
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn iso(&self) -> &str {
        &self.iso
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[NormalizedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.records.first().map(|r| r.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.records.last().map(|r| r.timestamp)
    }

    /// Keep records in `[start, end)`.
    ///
    /// Daily datasets also keep the last record before `start`, which later
    /// seeds the forward fill of the first hours of the range.
    pub fn clip(mut self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        let seed = match self.granularity {
            Granularity::Daily => self
                .records
                .iter()
                .rposition(|r| r.timestamp < start),
            Granularity::Hourly => None,
        };

        let mut index = 0;
        self.records.retain(|record| {
            let keep = Some(index) == seed || (record.timestamp >= start && record.timestamp < end);
            index += 1;
            keep
        });
        self
    }
}

/// Half-open `[start, end)` window shared by every merged source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ValidRange {
    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    pub fn hours(&self) -> i64 {
        (self.end - self.start).num_hours()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DerivedFeatures {
    pub forecast_error: Option<f64>,
    pub peak: u8,
    pub wind_share: Option<f64>,
}

pub const FEATURE_COLUMNS: [&str; 3] = ["forecast_error", "peak", "wind_share"];

#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub timestamp: NaiveDateTime,
    pub values: Vec<Option<f64>>,
    pub features: Option<DerivedFeatures>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedDataset {
    pub iso: String,
    pub columns: Vec<String>,
    pub rows: Vec<MergedRow>,
    pub range: ValidRange,
    /// Hours inside `range` that at least one source was missing.
    pub gap_hours: usize,
}

impl MergedDataset {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<f64> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.values.get(idx).copied().flatten()
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.rows.iter().map(|r| r.timestamp).collect()
    }

    pub fn has_features(&self) -> bool {
        !self.rows.is_empty() && self.rows.iter().all(|r| r.features.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        day(y, m, d).and_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn test_period_generation() {
        let days = Period::days(day(2014, 12, 30), day(2015, 1, 2));
        assert_eq!(days.len(), 4);
        assert_eq!(days[0], Period::Day(day(2014, 12, 30)));

        let years = Period::years(day(2014, 12, 30), day(2015, 1, 2));
        assert_eq!(years, vec![Period::Year(2014), Period::Year(2015)]);
        assert!(Period::years(day(2015, 1, 2), day(2014, 1, 1)).is_empty());
    }

    #[test]
    fn test_period_spans() {
        let d = Period::Day(day(2014, 3, 1));
        assert!(d.contains(at(2014, 3, 1, 0)));
        assert!(d.contains(at(2014, 3, 1, 23)));
        assert!(!d.contains(at(2014, 3, 2, 0)));

        let y = Period::Year(2016);
        let (start, end) = y.span();
        assert_eq!(start, at(2016, 1, 1, 0));
        assert_eq!(end, at(2017, 1, 1, 0));

        let h = Period::History { end: day(2014, 1, 3) };
        assert!(h.contains(at(1997, 1, 7, 0)));
        assert!(!h.contains(at(2014, 1, 4, 0)));
    }

    #[test]
    fn test_source_kind_parsing() {
        assert_eq!("gen-mix".parse::<SourceKind>().unwrap(), SourceKind::GenMix);
        assert_eq!("DA_OFFERS".parse::<SourceKind>().unwrap(), SourceKind::DaOffers);
        assert!("coal".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_dataset_sorts_and_rejects_duplicates() {
        let records = vec![
            NormalizedRecord::new(at(2014, 1, 1, 2), "MISO").with_field("x", Some(2.0)),
            NormalizedRecord::new(at(2014, 1, 1, 1), "MISO").with_field("x", Some(1.0)),
        ];
        let ds = SourceDataset::new(
            SourceKind::Load,
            Granularity::Hourly,
            "MISO",
            vec!["x".into()],
            records.clone(),
        )
        .unwrap();
        assert_eq!(ds.first_timestamp(), Some(at(2014, 1, 1, 1)));
        assert_eq!(ds.last_timestamp(), Some(at(2014, 1, 1, 2)));

        let mut dup = records;
        dup.push(NormalizedRecord::new(at(2014, 1, 1, 1), "MISO"));
        let err = SourceDataset::new(SourceKind::Load, Granularity::Hourly, "MISO", vec![], dup)
            .unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateTimestamp { dataset: SourceKind::Load, .. }));
    }

    #[test]
    fn test_clip_keeps_daily_seed() {
        let records = vec![
            NormalizedRecord::new(at(2013, 12, 30, 0), "EIA").with_field("hh_price", Some(4.1)),
            NormalizedRecord::new(at(2013, 12, 31, 0), "EIA").with_field("hh_price", Some(4.2)),
            NormalizedRecord::new(at(2014, 1, 2, 0), "EIA").with_field("hh_price", Some(4.3)),
            NormalizedRecord::new(at(2014, 1, 9, 0), "EIA").with_field("hh_price", Some(4.4)),
        ];
        let daily = SourceDataset::new(
            SourceKind::GasPrice,
            Granularity::Daily,
            "EIA",
            vec!["hh_price".into()],
            records.clone(),
        )
        .unwrap()
        .clip(at(2014, 1, 1, 0), at(2014, 1, 4, 0));
        let kept: Vec<_> = daily.records().iter().map(|r| r.timestamp).collect();
        assert_eq!(kept, vec![at(2013, 12, 31, 0), at(2014, 1, 2, 0)]);

        let hourly = SourceDataset::new(SourceKind::Load, Granularity::Hourly, "MISO", vec![], records)
            .unwrap()
            .clip(at(2014, 1, 1, 0), at(2014, 1, 4, 0));
        assert_eq!(hourly.len(), 1);
    }

    #[test]
    fn test_hour_floor() {
        let ts = day(2014, 1, 1).and_hms_opt(5, 42, 17).unwrap();
        assert_eq!(hour_floor(ts), at(2014, 1, 1, 5));
    }
}
