//! Real-time generation by fuel type.
//!
//! Before August 2015 the history is published as one workbook per year,
//! spread over up to five sheets of long records (date, hour, fuel, MW).
//! From then on a daily report carries one wide row per hour. Both paths end
//! in the same columns: one `<fuel> mw` column per fuel plus `total mw`.

use crate::adapter::{PeriodRequest, SourceAdapter, Timestamped};
use crate::categories::{fuel_label, fuel_vocabulary, FUEL_TYPES};
use crate::config::{PipelineConfig, UnknownCategoryPolicy};
use crate::error::{PipelineError, SchemaMismatchError};
use crate::models::{midnight, Granularity, NormalizedRecord, Period, SourceDataset, SourceKind};
use crate::normalizer::{
    hour_starting, log_dropped_rows, parse_date, parse_hour_ending, ColumnSpec, TableLayout,
};
use crate::pivot::{Aggregation, LongRecord, Pivot, PivotMetric};
use crate::raw_table::RawPeriodTable;
use chrono::{Datelike, NaiveDate, NaiveDateTime};

pub const TOTAL_COLUMN: &str = "total mw";
const SHEETS_PER_WORKBOOK: u8 = 5;

const GEN_MIX_METRICS: [PivotMetric; 1] = [PivotMetric::new("mw", Aggregation::Sum)];

const ANNUAL_COLUMNS: [ColumnSpec; 4] = [
    ColumnSpec::labeled("date", 0, "Market Date"),
    ColumnSpec::labeled("hour", 1, "HourEnding"),
    ColumnSpec::labeled("fuel", 2, "Fuel Type"),
    ColumnSpec::labeled("mw", 3, "RT Generation"),
];

pub const ANNUAL_LAYOUT: TableLayout = TableLayout {
    name: "historical_gen_fuel_mix",
    header_row: Some(1),
    footer_rows: 0,
    columns: &ANNUAL_COLUMNS,
};

const CONTINUATION_COLUMNS: [ColumnSpec; 4] = [
    ColumnSpec::at("date", 0),
    ColumnSpec::at("hour", 1),
    ColumnSpec::at("fuel", 2),
    ColumnSpec::at("mw", 3),
];

pub const CONTINUATION_LAYOUT: TableLayout = TableLayout {
    name: "historical_gen_fuel_mix_continued",
    header_row: None,
    footer_rows: 0,
    columns: &CONTINUATION_COLUMNS,
};

const DAILY_EARLY_COLUMNS: [ColumnSpec; 7] = [
    ColumnSpec::at("hour", 0),
    ColumnSpec::header_within("coal", "Coal", 34, 40),
    ColumnSpec::header_within("gas", "Gas", 34, 40),
    ColumnSpec::header_within("hydro", "Hydro", 34, 40),
    ColumnSpec::header_within("nuclear", "Nuclear", 34, 40),
    ColumnSpec::header_within("wind", "Wind", 34, 40),
    ColumnSpec::header_within("other", "Other", 34, 40),
];

pub const DAILY_EARLY_LAYOUT: TableLayout = TableLayout {
    name: "sr_gfm_2015",
    header_row: Some(8),
    footer_rows: 2,
    columns: &DAILY_EARLY_COLUMNS,
};

const DAILY_COLUMNS: [ColumnSpec; 7] = [
    ColumnSpec::at("hour", 0),
    ColumnSpec::header_within("coal", "Coal", 26, 32),
    ColumnSpec::header_within("gas", "Gas", 26, 32),
    ColumnSpec::header_within("hydro", "Hydro", 26, 32),
    ColumnSpec::header_within("nuclear", "Nuclear", 26, 32),
    ColumnSpec::header_within("wind", "Wind", 26, 32),
    ColumnSpec::header_within("other", "Other", 26, 32),
];

pub const DAILY_LAYOUT: TableLayout = TableLayout {
    name: "sr_gfm",
    header_row: Some(4),
    footer_rows: 2,
    columns: &DAILY_COLUMNS,
};

/// First day published as a daily report.
pub fn daily_cutover() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 8, 1).unwrap_or_default()
}

/// Report format in force for a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenMixEra {
    /// Sheet `index` of a yearly workbook; sheet 0 carries the header.
    AnnualWorkbook { sheet: u8 },
    DailyEarly,
    Daily,
}

impl GenMixEra {
    pub fn for_date(day: NaiveDate) -> Self {
        if day < daily_cutover() {
            GenMixEra::AnnualWorkbook { sheet: 0 }
        } else if day.year() == 2015 || (day.year() == 2016 && day.month() == 1 && day.day() < 4) {
            GenMixEra::DailyEarly
        } else {
            GenMixEra::Daily
        }
    }

    fn layout(self) -> TableLayout {
        match self {
            GenMixEra::AnnualWorkbook { sheet: 0 } => ANNUAL_LAYOUT,
            GenMixEra::AnnualWorkbook { .. } => CONTINUATION_LAYOUT,
            GenMixEra::DailyEarly => DAILY_EARLY_LAYOUT,
            GenMixEra::Daily => DAILY_LAYOUT,
        }
    }
}

fn sheet_name(year: i32, sheet: u8) -> String {
    if sheet == 0 {
        year.to_string()
    } else {
        format!("{}({})", year, sheet)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenMixItem {
    /// One hour of a daily report, already in canonical columns.
    Wide(NormalizedRecord),
    /// One fuel for one hour of an annual workbook.
    Long(LongRecord),
}

impl Timestamped for GenMixItem {
    fn timestamp(&self) -> NaiveDateTime {
        match self {
            GenMixItem::Wide(r) => r.timestamp,
            GenMixItem::Long(r) => r.timestamp,
        }
    }

    fn one_per_hour(&self) -> bool {
        matches!(self, GenMixItem::Wide(_))
    }
}

fn fuel_column(label: &str) -> String {
    format!("{} mw", label)
}

pub struct GenMixAdapter {
    iso: String,
    policy: UnknownCategoryPolicy,
}

impl GenMixAdapter {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            iso: config.iso.clone(),
            policy: config.unknown_categories,
        }
    }

    fn normalize_annual(
        &self,
        layout: TableLayout,
        table: &RawPeriodTable,
    ) -> Result<Vec<GenMixItem>, SchemaMismatchError> {
        let bound = layout.bind(table)?;
        let cutover = midnight(daily_cutover());
        let mut dropped = 0;
        let mut items = Vec::new();

        for row in bound.rows() {
            let date = row.get("date").and_then(parse_date);
            let hour = row.get("hour").and_then(parse_hour_ending);
            let (Some(date), Some(hour), Some(fuel), Some(mw)) = (date, hour, row.get("fuel"), row.number("mw"))
            else {
                dropped += 1;
                continue;
            };
            let timestamp = hour_starting(date, hour);
            if timestamp >= cutover {
                continue;
            }
            items.push(GenMixItem::Long(LongRecord {
                timestamp,
                category: fuel_label(fuel),
                values: vec![Some(mw)],
            }));
        }

        log_dropped_rows(layout.name, &table.address, dropped);
        Ok(items)
    }

    fn normalize_daily(
        &self,
        day: NaiveDate,
        layout: TableLayout,
        table: &RawPeriodTable,
    ) -> Result<Vec<GenMixItem>, SchemaMismatchError> {
        let bound = layout.bind(table)?;
        let mut dropped = 0;
        let mut items = Vec::new();

        for row in bound.rows() {
            let hour = row.get("hour").and_then(parse_hour_ending);
            let mw: Option<Vec<f64>> = FUEL_TYPES.iter().map(|(_, label)| row.number(label)).collect();
            let (Some(hour), Some(mw)) = (hour, mw) else {
                dropped += 1;
                continue;
            };
            let record = FUEL_TYPES.iter().zip(mw).fold(
                NormalizedRecord::new(hour_starting(day, hour), self.iso.as_str()),
                |record, ((_, label), value)| record.with_field(fuel_column(label), Some(value)),
            );
            items.push(GenMixItem::Wide(record));
        }

        log_dropped_rows(layout.name, &table.address, dropped);
        Ok(items)
    }
}

/// Sum of the six fuels, null when any of them is.
fn total(record: &NormalizedRecord) -> Option<f64> {
    FUEL_TYPES
        .iter()
        .map(|(_, label)| record.field(&fuel_column(label)))
        .sum()
}

impl SourceAdapter for GenMixAdapter {
    type Variant = GenMixEra;
    type Item = GenMixItem;

    fn name(&self) -> &'static str {
        "gen_mix"
    }

    fn requests(&self, config: &PipelineConfig) -> Vec<PeriodRequest<GenMixEra>> {
        let cutover = daily_cutover();
        let mut requests = Vec::new();

        for period in config.years() {
            let Period::Year(year) = period else { continue };
            if period.first_day().max(config.start_date) >= cutover {
                continue;
            }
            let workbook = format!("{}Historical_Gen_Fuel_Mix_{}.xls", config.miso_base_url, year);
            for sheet in 0..SHEETS_PER_WORKBOOK {
                requests.push(PeriodRequest {
                    period,
                    address: format!("{}#{}", workbook, sheet_name(year, sheet)),
                    variant: GenMixEra::AnnualWorkbook { sheet },
                });
            }
        }

        for period in config.days() {
            let Period::Day(day) = period else { continue };
            if day < cutover {
                continue;
            }
            requests.push(PeriodRequest {
                period,
                address: format!("{}{}_sr_gfm.xls", config.miso_base_url, day.format("%Y%m%d")),
                variant: GenMixEra::for_date(day),
            });
        }

        requests
    }

    fn normalize(
        &self,
        request: &PeriodRequest<GenMixEra>,
        table: &RawPeriodTable,
    ) -> Result<Vec<GenMixItem>, SchemaMismatchError> {
        let layout = request.variant.layout();
        match (request.variant, request.period) {
            (GenMixEra::AnnualWorkbook { .. }, _) => self.normalize_annual(layout, table),
            (_, Period::Day(day)) => self.normalize_daily(day, layout, table),
            (_, other) => Err(SchemaMismatchError::new(
                layout.name,
                format!("daily report requested for {}", other),
            )),
        }
    }

    fn assemble(&self, items: Vec<GenMixItem>) -> Result<Vec<SourceDataset>, PipelineError> {
        let mut wide = Vec::new();
        let mut long = Vec::new();
        for item in items {
            match item {
                GenMixItem::Wide(r) => wide.push(r),
                GenMixItem::Long(r) => long.push(r),
            }
        }

        let vocabulary = fuel_vocabulary();
        let pivot = Pivot::new(SourceKind::GenMix, &GEN_MIX_METRICS, &vocabulary, self.policy);
        let table = pivot.run(long)?;

        let mut columns = table.columns.clone();
        columns.push(TOTAL_COLUMN.to_string());

        let mut records = table.into_records(&self.iso);
        records.append(&mut wide);
        for record in &mut records {
            let sum = total(record);
            record.fields.insert(TOTAL_COLUMN.to_string(), sum);
        }

        Ok(vec![SourceDataset::new(
            SourceKind::GenMix,
            Granularity::Hourly,
            self.iso.as_str(),
            columns,
            records,
        )?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn adapter() -> GenMixAdapter {
        GenMixAdapter::new(&PipelineConfig::new(day(2014, 1, 1), day(2014, 1, 1)))
    }

    /// Header at `header_row`, fuel labels starting at `first_fuel`.
    fn daily_table(header_row: usize, first_fuel: usize, hours: &[&str]) -> RawPeriodTable {
        let mut rows = vec![strings(&["Generation Fuel Mix"]); header_row];
        let mut header = vec![String::new(); first_fuel + 6];
        header[0] = "Market Hour Ending".into();
        for (i, label) in ["Coal", "Gas", "Hydro", "Nuclear", "Wind", "Other"].iter().enumerate() {
            header[first_fuel + i] = label.to_string();
        }
        rows.push(header);
        for he in hours {
            let mut row = vec!["0".to_string(); first_fuel + 6];
            row[0] = he.to_string();
            for i in 0..6 {
                row[first_fuel + i] = format!("{}", (i + 1) * 100);
            }
            rows.push(row);
        }
        rows.push(strings(&["Totals"]));
        rows.push(strings(&["Notes"]));
        RawPeriodTable::new("mem://sr_gfm", rows)
    }

    #[test]
    fn test_era_selection() {
        assert_eq!(
            GenMixEra::for_date(day(2015, 7, 31)),
            GenMixEra::AnnualWorkbook { sheet: 0 }
        );
        assert_eq!(GenMixEra::for_date(day(2015, 8, 1)), GenMixEra::DailyEarly);
        assert_eq!(GenMixEra::for_date(day(2016, 1, 3)), GenMixEra::DailyEarly);
        assert_eq!(GenMixEra::for_date(day(2016, 1, 4)), GenMixEra::Daily);
    }

    #[test]
    fn test_requests_split_at_cutover() {
        let mut config = PipelineConfig::new(day(2015, 7, 31), day(2015, 8, 2));
        config.miso_base_url = "mem://".into();
        let requests = adapter().requests(&config);

        let annual: Vec<&str> = requests
            .iter()
            .filter(|r| matches!(r.variant, GenMixEra::AnnualWorkbook { .. }))
            .map(|r| r.address.as_str())
            .collect();
        assert_eq!(annual.len(), 5);
        assert_eq!(annual[0], "mem://Historical_Gen_Fuel_Mix_2015.xls#2015");
        assert_eq!(annual[4], "mem://Historical_Gen_Fuel_Mix_2015.xls#2015(4)");

        let daily: Vec<&str> = requests[5..].iter().map(|r| r.address.as_str()).collect();
        assert_eq!(daily, vec!["mem://20150801_sr_gfm.xls", "mem://20150802_sr_gfm.xls"]);

        let late = PipelineConfig::new(day(2015, 9, 1), day(2015, 9, 1));
        assert_eq!(adapter().requests(&late).len(), 1);
    }

    #[test]
    fn test_daily_layouts() {
        let early = PeriodRequest {
            period: Period::Day(day(2015, 9, 1)),
            address: "mem://sr_gfm".into(),
            variant: GenMixEra::DailyEarly,
        };
        let items = adapter()
            .normalize(&early, &daily_table(8, 34, &["1", "2"]))
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].timestamp(), day(2015, 9, 1).and_hms_opt(1, 0, 0).unwrap());

        // The current layout's positions do not fit the early file.
        let current = PeriodRequest {
            variant: GenMixEra::Daily,
            ..early.clone()
        };
        assert!(adapter().normalize(&current, &daily_table(8, 34, &["1"])).is_err());

        let mut gappy = daily_table(8, 34, &["1", "2"]);
        gappy.rows[10][35] = "NA".into();
        let items = adapter().normalize(&early, &gappy).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].timestamp(), day(2015, 9, 1).and_hms_opt(0, 0, 0).unwrap());

        let items = adapter()
            .normalize(&current, &daily_table(4, 26, &["24"]))
            .unwrap();
        let datasets = adapter().assemble(items).unwrap();
        let record = &datasets[0].records()[0];
        assert_eq!(record.timestamp, day(2015, 9, 1).and_hms_opt(23, 0, 0).unwrap());
        assert_eq!(record.field("coal mw"), Some(100.0));
        assert_eq!(record.field("other mw"), Some(600.0));
        assert_eq!(record.field(TOTAL_COLUMN), Some(2100.0));
    }

    #[test]
    fn test_annual_sheets_pivot_and_sum() {
        let first = RawPeriodTable::new(
            "mem://wb#2014",
            vec![
                strings(&["Historical Generation Fuel Mix"]),
                strings(&["Market Date", "HourEnding", "Fuel Type", "RT Generation (State Estimated), MW"]),
                strings(&["2014-01-01", "1", "COAL", "40000"]),
                strings(&["2014-01-01", "1", "GAS", "8000"]),
                strings(&["2014-01-01", "1", "HYDRO", "500"]),
                strings(&["2014-01-01", "1", "NUCLEAR", "11000"]),
                strings(&["2014-01-01", "1", "WIND", "3000"]),
            ],
        );
        let continuation = RawPeriodTable::new(
            "mem://wb#2014(1)",
            vec![
                strings(&["2014-01-01", "1", "OTHER", "200"]),
                strings(&["2014-01-01", "1", "COAL", "100"]),
                strings(&["2014-01-01", "2", "GAS", "NA"]),
                strings(&["2014-01-01", "2", "COAL", "39000"]),
            ],
        );
        let request = |sheet| PeriodRequest {
            period: Period::Year(2014),
            address: "mem://wb".into(),
            variant: GenMixEra::AnnualWorkbook { sheet },
        };

        let gm = adapter();
        let mut items = gm.normalize(&request(0), &first).unwrap();
        items.extend(gm.normalize(&request(1), &continuation).unwrap());
        assert!(gm.normalize(&request(0), &continuation).is_err());

        let datasets = gm.assemble(items).unwrap();
        let ds = &datasets[0];
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.columns().last().map(String::as_str), Some(TOTAL_COLUMN));

        let first_hour = &ds.records()[0];
        assert_eq!(first_hour.field("coal mw"), Some(40100.0));
        assert_eq!(first_hour.field(TOTAL_COLUMN), Some(62800.0));

        // Second hour only reports coal (the NA gas row is dropped), so the total is undefined.
        assert_eq!(ds.records()[1].field("gas mw"), None);
        assert_eq!(ds.records()[1].field(TOTAL_COLUMN), None);
    }
}
