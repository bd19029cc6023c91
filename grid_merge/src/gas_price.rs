//! EIA Henry Hub daily spot price history.

use crate::adapter::{PeriodRequest, SourceAdapter};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, SchemaMismatchError};
use crate::models::{midnight, Granularity, NormalizedRecord, Period, SourceDataset, SourceKind};
use crate::normalizer::{log_dropped_rows, parse_date, ColumnSpec, TableLayout};
use crate::raw_table::RawPeriodTable;

pub const GAS_ISO: &str = "EIA";
pub const GAS_FIELD: &str = "hh_price";

const GAS_COLUMNS: [ColumnSpec; 2] = [
    ColumnSpec::labeled("date", 0, "Date"),
    ColumnSpec::at(GAS_FIELD, 1),
];

/// Sheet `Data 1`: a contents link and the source key precede the header.
pub const GAS_LAYOUT: TableLayout = TableLayout {
    name: "rngwhhd_data_1",
    header_row: Some(2),
    footer_rows: 0,
    columns: &GAS_COLUMNS,
};

pub struct GasPriceAdapter;

impl GasPriceAdapter {
    pub fn new(_config: &PipelineConfig) -> Self {
        GasPriceAdapter
    }
}

impl SourceAdapter for GasPriceAdapter {
    type Variant = ();
    type Item = NormalizedRecord;

    fn name(&self) -> &'static str {
        "gas_price"
    }

    fn requests(&self, config: &PipelineConfig) -> Vec<PeriodRequest<()>> {
        vec![PeriodRequest {
            period: Period::History {
                end: config.end_date,
            },
            address: config.gas_price_url.clone(),
            variant: (),
        }]
    }

    fn normalize(
        &self,
        _request: &PeriodRequest<()>,
        table: &RawPeriodTable,
    ) -> Result<Vec<NormalizedRecord>, SchemaMismatchError> {
        let bound = GAS_LAYOUT.bind(table)?;
        let mut dropped = 0;
        let mut records = Vec::new();

        for row in bound.rows() {
            match (row.get("date").and_then(parse_date), row.number(GAS_FIELD)) {
                (Some(date), Some(price)) => records.push(
                    NormalizedRecord::new(midnight(date), GAS_ISO).with_field(GAS_FIELD, Some(price)),
                ),
                _ => dropped += 1,
            }
        }

        log_dropped_rows(GAS_LAYOUT.name, &table.address, dropped);
        Ok(records)
    }

    fn assemble(&self, items: Vec<NormalizedRecord>) -> Result<Vec<SourceDataset>, PipelineError> {
        Ok(vec![SourceDataset::new(
            SourceKind::GasPrice,
            Granularity::Daily,
            GAS_ISO,
            vec![GAS_FIELD.to_string()],
            items,
        )?])
    }
}
