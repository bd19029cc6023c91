//! Daily real-time final LMP reports, averaged across the trading hubs.

use crate::adapter::{PeriodRequest, SourceAdapter, Timestamped};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, SchemaMismatchError};
use crate::models::{Granularity, NormalizedRecord, Period, SourceDataset, SourceKind};
use crate::normalizer::{hour_starting, log_dropped_rows, ColumnSpec, TableLayout};
use crate::raw_table::RawPeriodTable;
use chrono::NaiveDateTime;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

pub const TRADING_HUBS: [&str; 7] = [
    "MINN.HUB",
    "ILLINOIS.HUB",
    "MICHIGAN.HUB",
    "INDIANA.HUB",
    "ARKANSAS.HUB",
    "LOUISIANA.HUB",
    "TEXAS.HUB",
];

const LMP_COLUMNS: [ColumnSpec; 3] = [
    ColumnSpec::header("node", "Node"),
    ColumnSpec::header("type", "Type"),
    ColumnSpec::header("value", "Value"),
];

pub const LMP_LAYOUT: TableLayout = TableLayout {
    name: "rt_lmp_final",
    header_row: Some(3),
    footer_rows: 0,
    columns: &LMP_COLUMNS,
};

static HOUR_COLUMN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^HE\s*0?(\d{1,2})$").expect("valid hour column pattern"));

/// One hub's price for one hour.
#[derive(Debug, Clone, PartialEq)]
pub struct HubPrice {
    pub timestamp: NaiveDateTime,
    pub hub: String,
    pub lmp: Option<f64>,
}

impl Timestamped for HubPrice {
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
}

/// Positions of the `HE 1`..`HE 24` columns, indexed by hour ending - 1.
fn hour_columns(header: &[String]) -> Result<[usize; 24], SchemaMismatchError> {
    let mut positions = [usize::MAX; 24];
    for (pos, label) in header.iter().enumerate() {
        let hour = HOUR_COLUMN
            .captures(label.trim())
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok());
        if let Some(hour @ 1..=24) = hour {
            positions[hour - 1] = pos;
        }
    }

    match positions.iter().position(|p| *p == usize::MAX) {
        Some(missing) => Err(SchemaMismatchError::new(
            LMP_LAYOUT.name,
            format!("no column for hour ending {}", missing + 1),
        )),
        None => Ok(positions),
    }
}

pub struct LmpAdapter {
    iso: String,
}

impl LmpAdapter {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            iso: config.iso.clone(),
        }
    }
}

impl SourceAdapter for LmpAdapter {
    type Variant = ();
    type Item = HubPrice;

    fn name(&self) -> &'static str {
        "lmp"
    }

    fn requests(&self, config: &PipelineConfig) -> Vec<PeriodRequest<()>> {
        config
            .days()
            .into_iter()
            .filter_map(|period| match period {
                Period::Day(day) => Some(PeriodRequest {
                    period,
                    address: format!(
                        "{}{}_rt_lmp_final.csv",
                        config.miso_base_url,
                        day.format("%Y%m%d")
                    ),
                    variant: (),
                }),
                _ => None,
            })
            .collect()
    }

    fn normalize(
        &self,
        request: &PeriodRequest<()>,
        table: &RawPeriodTable,
    ) -> Result<Vec<HubPrice>, SchemaMismatchError> {
        let Period::Day(day) = request.period else {
            return Ok(Vec::new());
        };
        let bound = LMP_LAYOUT.bind(table)?;
        let hours = hour_columns(bound.header())?;

        let mut prices = Vec::new();
        let mut dropped = 0;
        for row in bound.rows() {
            let Some(node) = row.get("node") else {
                dropped += 1;
                continue;
            };
            let is_hub = TRADING_HUBS.iter().any(|hub| hub.eq_ignore_ascii_case(node));
            let is_lmp = row.get("value").is_some_and(|v| v.eq_ignore_ascii_case("LMP"));
            if !is_hub || !is_lmp {
                continue;
            }
            for (i, pos) in hours.iter().enumerate() {
                prices.push(HubPrice {
                    timestamp: hour_starting(day, i as u32 + 1),
                    hub: node.to_ascii_uppercase(),
                    lmp: row.number_at(*pos),
                });
            }
        }

        log_dropped_rows(LMP_LAYOUT.name, &table.address, dropped);
        Ok(prices)
    }

    /// Mean across hubs per hour, nulls skipped. Hours no hub priced are left out.
    fn assemble(&self, items: Vec<HubPrice>) -> Result<Vec<SourceDataset>, PipelineError> {
        let mut hourly: BTreeMap<NaiveDateTime, (f64, usize)> = BTreeMap::new();
        for price in items {
            let entry = hourly.entry(price.timestamp).or_insert((0.0, 0));
            if let Some(lmp) = price.lmp {
                entry.0 += lmp;
                entry.1 += 1;
            }
        }

        let records = hourly
            .into_iter()
            .filter(|(_, (_, count))| *count > 0)
            .map(|(timestamp, (sum, count))| {
                NormalizedRecord::new(timestamp, self.iso.as_str()).with_field("lmp", Some(sum / count as f64))
            })
            .collect();

        Ok(vec![SourceDataset::new(
            SourceKind::Lmp,
            Granularity::Hourly,
            self.iso.as_str(),
            vec!["lmp".to_string()],
            records,
        )?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2014, 1, 1).unwrap()
    }

    fn header() -> Vec<String> {
        let mut header = vec!["Node".to_string(), "Type".to_string(), "Value".to_string()];
        header.extend((1..=24).map(|h| format!("HE {}", h)));
        header
    }

    fn row(node: &str, value: &str, price: f64) -> Vec<String> {
        let mut row = vec![node.to_string(), "Hub".to_string(), value.to_string()];
        row.extend((1..=24).map(|h| format!("{}", price + h as f64)));
        row
    }

    fn table() -> RawPeriodTable {
        RawPeriodTable::new(
            "mem://20140101_rt_lmp_final.csv",
            vec![
                vec!["Real-Time Final Market LMPs".to_string()],
                vec!["01/01/2014".to_string()],
                vec!["All Hours-Ending are Eastern Standard Time (EST)".to_string()],
                header(),
                row("MINN.HUB", "LMP", 20.0),
                row("MINN.HUB", "MCC", -1.0),
                row("ILLINOIS.HUB", "LMP", 30.0),
                row("AMIL.BGS6", "LMP", 500.0),
            ],
        )
    }

    fn request() -> PeriodRequest<()> {
        PeriodRequest {
            period: Period::Day(day()),
            address: "mem://20140101_rt_lmp_final.csv".into(),
            variant: (),
        }
    }

    #[test]
    fn test_hubs_melted_and_averaged() {
        let config = PipelineConfig::new(day(), day());
        let adapter = LmpAdapter::new(&config);
        let prices = adapter.normalize(&request(), &table()).unwrap();
        assert_eq!(prices.len(), 48);
        assert_eq!(prices[0].timestamp, day().and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(prices[23].timestamp, day().and_hms_opt(23, 0, 0).unwrap());

        let datasets = adapter.assemble(prices).unwrap();
        let lmp = &datasets[0];
        assert_eq!(lmp.len(), 24);
        // HE 1: (21 + 31) / 2
        assert_eq!(lmp.records()[0].field("lmp"), Some(26.0));
        assert_eq!(lmp.records()[23].field("lmp"), Some(49.0));
    }

    #[test]
    fn test_unpriced_hour_is_left_out() {
        let config = PipelineConfig::new(day(), day());
        let adapter = LmpAdapter::new(&config);
        let mut raw = table();
        // Blank HE 2 for both hubs; MINN.HUB also misses HE 3.
        raw.rows[4][4] = "".into();
        raw.rows[4][5] = "NA".into();
        raw.rows[6][4] = "".into();

        let prices = adapter.normalize(&request(), &raw).unwrap();
        let lmp = &adapter.assemble(prices).unwrap()[0];
        assert_eq!(lmp.len(), 23);
        assert!(lmp.records().iter().all(|r| r.field("lmp").is_some()));
        assert_eq!(lmp.records()[1].timestamp, day().and_hms_opt(2, 0, 0).unwrap());
        // HE 3 from ILLINOIS.HUB alone.
        assert_eq!(lmp.records()[1].field("lmp"), Some(33.0));
    }

    #[test]
    fn test_missing_hour_column_is_schema_mismatch() {
        let config = PipelineConfig::new(day(), day());
        let adapter = LmpAdapter::new(&config);
        let mut raw = table();
        raw.rows[3].truncate(20);
        let err = adapter.normalize(&request(), &raw).unwrap_err();
        assert!(err.detail.contains("hour ending 18"));
    }

    #[test]
    fn test_requests_use_daily_addresses() {
        let mut config = PipelineConfig::new(day(), day() + chrono::Duration::days(1));
        config.miso_base_url = "mem://".into();
        let requests = LmpAdapter::new(&config).requests(&config);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].address, "mem://20140102_rt_lmp_final.csv");
    }
}
