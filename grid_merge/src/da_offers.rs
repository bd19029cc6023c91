//! Day-ahead cleared offers, summarized per technology and hour.

use crate::adapter::{PeriodRequest, SourceAdapter};
use crate::categories::{technology_label, technology_vocabulary};
use crate::config::{PipelineConfig, UnknownCategoryPolicy};
use crate::error::{PipelineError, SchemaMismatchError};
use crate::models::{Granularity, Period, SourceDataset, SourceKind};
use crate::normalizer::{log_dropped_rows, parse_datetime, BoundRow, ColumnSpec, TableLayout};
use crate::pivot::{Aggregation, LongRecord, Pivot, PivotMetric};
use crate::raw_table::RawPeriodTable;

pub const OFFER_TIERS: usize = 10;

/// Metric order of every offer record.
pub const OFFER_METRICS: [PivotMetric; 4] = [
    PivotMetric::new("wavg_price", Aggregation::Mean),
    PivotMetric::new("Economic Max", Aggregation::Sum),
    PivotMetric::new("Economic Min", Aggregation::Sum),
    PivotMetric::new("Emergency Max", Aggregation::Sum),
];

const OFFER_COLUMNS: [ColumnSpec; 5] = [
    ColumnSpec::header("unit_type", "Unit Type"),
    // Hour-beginning, unlike the other reports.
    ColumnSpec::header("timestamp", "Date/Time Beginning (EST)"),
    ColumnSpec::header("Economic Max", "Economic Max"),
    ColumnSpec::header("Economic Min", "Economic Min"),
    ColumnSpec::header("Emergency Max", "Emergency Max"),
];

pub const OFFER_LAYOUT: TableLayout = TableLayout {
    name: "da_co",
    header_row: Some(0),
    footer_rows: 0,
    columns: &OFFER_COLUMNS,
};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OfferTier {
    pub price: f64,
    pub quantity: f64,
}

/// Capacity-weighted offer price, `None` when nothing is offered.
pub fn weighted_average_price(tiers: &[OfferTier]) -> Option<f64> {
    let quantity: f64 = tiers.iter().map(|t| t.quantity).sum();
    if quantity == 0.0 {
        return None;
    }
    let weighted: f64 = tiers.iter().map(|t| t.price * t.quantity).sum();
    Some(weighted / quantity)
}

/// Column positions of each `PriceN` / `MWN` pair, when present.
type TierColumns = [(Option<usize>, Option<usize>); OFFER_TIERS];

fn read_tiers(row: &BoundRow<'_>, columns: &TierColumns) -> Vec<OfferTier> {
    let value = |pos: Option<usize>| pos.and_then(|p| row.number_at(p)).unwrap_or(0.0);
    columns
        .iter()
        .map(|(price, quantity)| OfferTier {
            price: value(*price),
            quantity: value(*quantity),
        })
        .collect()
}

pub struct DaOffersAdapter {
    iso: String,
    policy: UnknownCategoryPolicy,
}

impl DaOffersAdapter {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            iso: config.iso.clone(),
            policy: config.unknown_categories,
        }
    }
}

impl SourceAdapter for DaOffersAdapter {
    type Variant = ();
    type Item = LongRecord;

    fn name(&self) -> &'static str {
        "da_offers"
    }

    fn requests(&self, config: &PipelineConfig) -> Vec<PeriodRequest<()>> {
        config
            .days()
            .into_iter()
            .filter_map(|period| match period {
                Period::Day(day) => Some(PeriodRequest {
                    period,
                    address: format!("{}{}_da_co.csv", config.miso_base_url, day.format("%Y%m%d")),
                    variant: (),
                }),
                _ => None,
            })
            .collect()
    }

    fn normalize(
        &self,
        _request: &PeriodRequest<()>,
        table: &RawPeriodTable,
    ) -> Result<Vec<LongRecord>, SchemaMismatchError> {
        let bound = OFFER_LAYOUT.bind(table)?;

        let mut tiers: TierColumns = [(None, None); OFFER_TIERS];
        for (i, tier) in tiers.iter_mut().enumerate() {
            *tier = (
                bound.find_header(&format!("Price{}", i + 1)),
                bound.find_header(&format!("MW{}", i + 1)),
            );
        }
        if tiers.iter().all(|(price, quantity)| price.is_none() && quantity.is_none()) {
            return Err(SchemaMismatchError::new(OFFER_LAYOUT.name, "no Price/MW offer tiers"));
        }

        let mut dropped = 0;
        let mut records = Vec::new();
        for row in bound.rows() {
            let timestamp = row.get("timestamp").and_then(parse_datetime);
            let (Some(timestamp), Some(unit_type)) = (timestamp, row.get("unit_type")) else {
                dropped += 1;
                continue;
            };

            let mut values = vec![weighted_average_price(&read_tiers(&row, &tiers))];
            values.extend(OFFER_METRICS[1..].iter().map(|m| row.number(m.name)));

            records.push(LongRecord {
                timestamp,
                category: technology_label(unit_type),
                values,
            });
        }

        log_dropped_rows(OFFER_LAYOUT.name, &table.address, dropped);
        Ok(records)
    }

    fn assemble(&self, items: Vec<LongRecord>) -> Result<Vec<SourceDataset>, PipelineError> {
        let vocabulary = technology_vocabulary();
        let table = Pivot::new(SourceKind::DaOffers, &OFFER_METRICS, &vocabulary, self.policy).run(items)?;
        let columns = table.columns.clone();

        Ok(vec![SourceDataset::new(
            SourceKind::DaOffers,
            Granularity::Hourly,
            self.iso.as_str(),
            columns,
            table.into_records(&self.iso),
        )?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tier(price: f64, quantity: f64) -> OfferTier {
        OfferTier { price, quantity }
    }

    fn offers_table(rows: &[[&str; 9]]) -> RawPeriodTable {
        let header = [
            "Region",
            "Unit Type",
            "Date/Time Beginning (EST)",
            "Economic Max",
            "Economic Min",
            "Emergency Max",
            "Price1",
            "MW1",
            "Price2",
            "MW2",
        ];
        let mut table = vec![header.iter().map(|c| c.to_string()).collect::<Vec<_>>()];
        for row in rows {
            let mut cells = vec!["North".to_string()];
            cells.extend(row.iter().map(|c| c.to_string()));
            table.push(cells);
        }
        RawPeriodTable::new("mem://20140101_da_co.csv", table)
    }

    fn request() -> PeriodRequest<()> {
        PeriodRequest {
            period: Period::Day(NaiveDate::from_ymd_opt(2014, 1, 1).unwrap()),
            address: "mem://20140101_da_co.csv".into(),
            variant: (),
        }
    }

    fn adapter() -> DaOffersAdapter {
        let day = NaiveDate::from_ymd_opt(2014, 1, 1).unwrap();
        DaOffersAdapter::new(&PipelineConfig::new(day, day))
    }

    #[test]
    fn test_weighted_average_price() {
        assert_eq!(weighted_average_price(&[tier(10.0, 5.0), tier(20.0, 0.0)]), Some(10.0));
        assert_eq!(weighted_average_price(&[tier(10.0, 1.0), tier(20.0, 3.0)]), Some(17.5));
        assert_eq!(weighted_average_price(&[tier(10.0, 0.0), tier(20.0, 0.0)]), None);
        assert_eq!(weighted_average_price(&[]), None);
    }

    #[test]
    fn test_offers_pivot_by_technology() {
        let table = offers_table(&[
            ["1", "01/01/2014 00:00", "100", "40", "110", "20", "50", "30", "50"],
            ["1", "01/01/2014 00:00", "200", "60", "210", "40", "10", "", ""],
            ["61", "01/01/2014 00:00", "80", "0", "80", "0", "0", "", ""],
            ["1", "01/01/2014 01:00", "100", "40", "110", "20", "100", "", ""],
            ["1", "", "100", "40", "110", "20", "100", "", ""],
        ]);
        let records = adapter().normalize(&request(), &table).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].category, "Single Boiler");
        assert_eq!(records[0].values[0], Some(25.0));
        assert_eq!(records[2].values[0], None);

        let datasets = adapter().assemble(records).unwrap();
        let ds = &datasets[0];
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.columns()[0], "Single Boiler wavg_price");
        assert_eq!(ds.columns()[1], "Single Boiler Economic Max");

        let first = &ds.records()[0];
        // Mean of 25 and 40; capacities summed.
        assert_eq!(first.field("Single Boiler wavg_price"), Some(32.5));
        assert_eq!(first.field("Single Boiler Economic Max"), Some(300.0));
        assert_eq!(first.field("Single Boiler Emergency Max"), Some(320.0));
        assert_eq!(first.field("Wind wavg_price"), None);
        assert_eq!(first.field("Wind Economic Max"), Some(80.0));
        assert_eq!(first.field("Pumped Storage Economic Max"), None);
        assert_eq!(first.timestamp, NaiveDate::from_ymd_opt(2014, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn test_missing_required_column_is_schema_mismatch() {
        let table = RawPeriodTable::new(
            "mem://bad",
            vec![vec!["Unit Type".to_string(), "Hour".to_string(), "Price1".to_string()]],
        );
        let err = adapter().normalize(&request(), &table).unwrap_err();
        assert_eq!(err.layout, "da_co");
    }
}
