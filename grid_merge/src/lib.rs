pub mod adapter;
pub mod categories;
pub mod config;
pub mod da_offers;
pub mod error;
pub mod features;
pub mod fetch;
pub mod gas_price;
pub mod gen_mix;
pub mod lmp;
pub mod load_wind;
pub mod merge;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod pivot;
pub mod raw_table;
pub mod workbook;

pub use adapter::{run_adapter, IngestReport, PeriodOutcome, PeriodRequest, PeriodStatus, SourceAdapter};
pub use config::{PeakHours, PipelineConfig, UnknownCategoryPolicy};
pub use error::{
    AggregationAmbiguityError, EmptyOverlapError, FetchError, PipelineError, SchemaMismatchError,
};
pub use features::FeatureDeriver;
pub use fetch::{CancelFlag, Fetch};
pub use merge::merge;
pub use models::{
    DerivedFeatures, Granularity, MergedDataset, MergedRow, NormalizedRecord, Period, SourceDataset,
    SourceKind, ValidRange,
};
pub use pipeline::{Pipeline, PipelineOutput};
pub use pivot::{Aggregation, LongRecord, Pivot, PivotMetric, PivotTable};
pub use raw_table::RawPeriodTable;
