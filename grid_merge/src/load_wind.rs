//! Annual historical load (forecast and actual) and wind generation reports.

use crate::adapter::{PeriodRequest, SourceAdapter, Timestamped};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, SchemaMismatchError};
use crate::models::{Granularity, NormalizedRecord, Period, SourceDataset, SourceKind};
use crate::normalizer::{
    hour_starting, log_dropped_rows, parse_date, parse_hour_ending, ColumnSpec, TableLayout,
};
use crate::raw_table::RawPeriodTable;
use chrono::{Datelike, NaiveDate, NaiveDateTime};

const LOAD_COLUMNS: [ColumnSpec; 5] = [
    ColumnSpec::at("date", 1),
    ColumnSpec::at("hour", 2),
    ColumnSpec::at("region", 3),
    ColumnSpec::at("forecast_load", 4),
    ColumnSpec::at("actual_load", 5),
];

pub const LOAD_LAYOUT: TableLayout = TableLayout {
    name: "rfal_hist",
    header_row: Some(5),
    footer_rows: 1,
    columns: &LOAD_COLUMNS,
};

const WIND_COLUMNS: [ColumnSpec; 3] = [
    ColumnSpec::at("date", 0),
    ColumnSpec::at("hour", 1),
    ColumnSpec::at("wind_mwh", 2),
];

pub const WIND_LAYOUT: TableLayout = TableLayout {
    name: "hwd_hist",
    header_row: Some(4),
    footer_rows: 1,
    columns: &WIND_COLUMNS,
};

pub const LOAD_FIELDS: [&str; 2] = ["forecast_load", "actual_load"];
pub const WIND_FIELDS: [&str; 1] = ["wind_mwh"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadWindReport {
    Load,
    Wind,
}

impl LoadWindReport {
    fn kind(self) -> SourceKind {
        match self {
            LoadWindReport::Load => SourceKind::Load,
            LoadWindReport::Wind => SourceKind::Wind,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadWindItem {
    Load(NormalizedRecord),
    Wind(NormalizedRecord),
}

impl Timestamped for LoadWindItem {
    fn timestamp(&self) -> NaiveDateTime {
        match self {
            LoadWindItem::Load(r) | LoadWindItem::Wind(r) => r.timestamp,
        }
    }

    fn one_per_hour(&self) -> bool {
        true
    }
}

/// Date stamped on a year's report: the last day for closed years, `as_of` otherwise.
pub fn report_date(year: i32, as_of: NaiveDate) -> String {
    if year < as_of.year() {
        format!("{}1231", year)
    } else {
        as_of.format("%Y%m%d").to_string()
    }
}

pub struct LoadWindAdapter {
    iso: String,
}

impl LoadWindAdapter {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            iso: config.iso.clone(),
        }
    }

    fn normalize_load(&self, table: &RawPeriodTable) -> Result<Vec<LoadWindItem>, SchemaMismatchError> {
        let bound = LOAD_LAYOUT.bind(table)?;
        let mut dropped = 0;
        let mut items = Vec::new();

        for row in bound.rows() {
            let region_matches = row
                .get("region")
                .is_some_and(|region| region.eq_ignore_ascii_case(&self.iso));
            if !region_matches {
                continue;
            }
            let timestamp = match (row.get("date").and_then(parse_date), row.get("hour").and_then(parse_hour_ending)) {
                (Some(date), Some(hour)) => hour_starting(date, hour),
                _ => {
                    dropped += 1;
                    continue;
                }
            };
            let values: Option<Vec<f64>> = LOAD_FIELDS.iter().map(|field| row.number(field)).collect();
            let Some(values) = values else {
                dropped += 1;
                continue;
            };
            let record = LOAD_FIELDS
                .iter()
                .zip(values)
                .fold(NormalizedRecord::new(timestamp, self.iso.as_str()), |record, (field, value)| {
                    record.with_field(*field, Some(value))
                });
            items.push(LoadWindItem::Load(record));
        }

        log_dropped_rows(LOAD_LAYOUT.name, &table.address, dropped);
        Ok(items)
    }

    fn normalize_wind(&self, table: &RawPeriodTable) -> Result<Vec<LoadWindItem>, SchemaMismatchError> {
        let bound = WIND_LAYOUT.bind(table)?;
        let mut dropped = 0;
        let mut items = Vec::new();

        for row in bound.rows() {
            match (
                row.get("date").and_then(parse_date),
                row.get("hour").and_then(parse_hour_ending),
                row.number("wind_mwh"),
            ) {
                (Some(date), Some(hour), Some(mwh)) => {
                    let record = NormalizedRecord::new(hour_starting(date, hour), self.iso.as_str())
                        .with_field("wind_mwh", Some(mwh));
                    items.push(LoadWindItem::Wind(record));
                }
                _ => dropped += 1,
            }
        }

        log_dropped_rows(WIND_LAYOUT.name, &table.address, dropped);
        Ok(items)
    }
}

impl SourceAdapter for LoadWindAdapter {
    type Variant = LoadWindReport;
    type Item = LoadWindItem;

    fn name(&self) -> &'static str {
        "load_wind"
    }

    fn requests(&self, config: &PipelineConfig) -> Vec<PeriodRequest<LoadWindReport>> {
        let mut requests = Vec::new();
        for period in config.years() {
            let Period::Year(year) = period else { continue };
            let date = report_date(year, config.as_of);
            for (report, suffix) in [
                (LoadWindReport::Load, "_rfal_hist.xls"),
                (LoadWindReport::Wind, "_hwd_hist.csv"),
            ] {
                if config.is_enabled(report.kind()) {
                    requests.push(PeriodRequest {
                        period,
                        address: format!("{}{}{}", config.miso_base_url, date, suffix),
                        variant: report,
                    });
                }
            }
        }
        requests
    }

    fn normalize(
        &self,
        request: &PeriodRequest<LoadWindReport>,
        table: &RawPeriodTable,
    ) -> Result<Vec<LoadWindItem>, SchemaMismatchError> {
        match request.variant {
            LoadWindReport::Load => self.normalize_load(table),
            LoadWindReport::Wind => self.normalize_wind(table),
        }
    }

    fn assemble(&self, items: Vec<LoadWindItem>) -> Result<Vec<SourceDataset>, PipelineError> {
        let (mut load, mut wind) = (Vec::new(), Vec::new());
        for item in items {
            match item {
                LoadWindItem::Load(r) => load.push(r),
                LoadWindItem::Wind(r) => wind.push(r),
            }
        }

        Ok(vec![
            SourceDataset::new(
                SourceKind::Load,
                Granularity::Hourly,
                self.iso.as_str(),
                LOAD_FIELDS.iter().map(|f| f.to_string()).collect(),
                load,
            )?,
            SourceDataset::new(
                SourceKind::Wind,
                Granularity::Hourly,
                self.iso.as_str(),
                WIND_FIELDS.iter().map(|f| f.to_string()).collect(),
                wind,
            )?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn raw(rows: &[&[&str]]) -> RawPeriodTable {
        RawPeriodTable::new(
            "mem://report",
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    fn load_table() -> RawPeriodTable {
        raw(&[
            &["Historical Regional Forecast and Actual Load"],
            &["Midcontinent ISO"],
            &[""],
            &["All times in EST"],
            &["MWh"],
            &["", "Market Day", "HourEnding", "Region", "MTLF (MWh)", "ActualLoad (MWh)"],
            &["", "01/01/2014", "1", "MISO", "61000", "60500.5"],
            &["", "01/01/2014", "1", "Central", "20000", "19900"],
            &["", "01/01/2014", "2", "MISO", "60000", "NA"],
            &["", "01/01/2014", "", "MISO", "1", "1"],
            &["Totals may not add up due to rounding"],
        ])
    }

    #[test]
    fn test_report_dates() {
        let as_of = day(2015, 6, 1);
        assert_eq!(report_date(2014, as_of), "20141231");
        assert_eq!(report_date(2015, as_of), "20150601");
    }

    #[test]
    fn test_requests_cover_each_year() {
        let mut config = PipelineConfig::new(day(2014, 12, 30), day(2015, 1, 2));
        config.as_of = day(2015, 6, 1);
        config.miso_base_url = "mem://".into();
        let adapter = LoadWindAdapter::new(&config);

        let addresses: Vec<String> = adapter.requests(&config).into_iter().map(|r| r.address).collect();
        assert_eq!(
            addresses,
            vec![
                "mem://20141231_rfal_hist.xls",
                "mem://20141231_hwd_hist.csv",
                "mem://20150601_rfal_hist.xls",
                "mem://20150601_hwd_hist.csv",
            ]
        );

        config.disabled_sources = vec![SourceKind::Wind];
        assert!(adapter
            .requests(&config)
            .iter()
            .all(|r| r.variant == LoadWindReport::Load));
    }

    #[test]
    fn test_load_keeps_system_region_only() {
        let config = PipelineConfig::new(day(2014, 1, 1), day(2014, 1, 1));
        let adapter = LoadWindAdapter::new(&config);
        let request = PeriodRequest {
            period: Period::Year(2014),
            address: "mem://report".into(),
            variant: LoadWindReport::Load,
        };
        let items = adapter.normalize(&request, &load_table()).unwrap();
        // The NA actual load and the blank hour are both dropped.
        assert_eq!(items.len(), 1);

        let LoadWindItem::Load(first) = &items[0] else {
            panic!("expected a load record");
        };
        assert_eq!(first.timestamp, day(2014, 1, 1).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(first.field("forecast_load"), Some(61000.0));
        assert_eq!(first.field("actual_load"), Some(60500.5));

        // Same table twice, same records.
        assert_eq!(adapter.normalize(&request, &load_table()).unwrap(), items);
    }

    #[test]
    fn test_wind_layout_mismatch() {
        let config = PipelineConfig::new(day(2014, 1, 1), day(2014, 1, 1));
        let adapter = LoadWindAdapter::new(&config);
        let request = PeriodRequest {
            period: Period::Year(2014),
            address: "mem://report".into(),
            variant: LoadWindReport::Wind,
        };
        let short = raw(&[&["only"], &["two rows"]]);
        assert!(adapter.normalize(&request, &short).is_err());

        let wind = raw(&[
            &["Historical Wind"],
            &[""],
            &["EST"],
            &["MWh"],
            &["Market Day", "HourEnding", "MWh"],
            &["01/02/2014", "23", ""],
            &["01/02/2014", "24", "3120.4"],
            &["end of report"],
        ]);
        let items = adapter.normalize(&request, &wind).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].timestamp(), day(2014, 1, 2).and_hms_opt(23, 0, 0).unwrap());

        let datasets = adapter.assemble(items).unwrap();
        assert_eq!(datasets[1].kind(), SourceKind::Wind);
        assert_eq!(datasets[1].records()[0].field("wind_mwh"), Some(3120.4));
        assert!(datasets[0].is_empty());
    }
}
