use crate::adapter::{run_adapter, IngestReport, SourceAdapter};
use crate::config::PipelineConfig;
use crate::da_offers::DaOffersAdapter;
use crate::error::PipelineError;
use crate::features::FeatureDeriver;
use crate::fetch::{CancelFlag, Fetch};
use crate::gas_price::GasPriceAdapter;
use crate::gen_mix::GenMixAdapter;
use crate::lmp::LmpAdapter;
use crate::load_wind::LoadWindAdapter;
use crate::merge::merge;
use crate::models::{midnight, MergedDataset, SourceDataset, SourceKind};
use chrono::Duration;

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub datasets: Vec<SourceDataset>,
    pub reports: Vec<IngestReport>,
    pub merged: MergedDataset,
}

impl PipelineOutput {
    pub fn dataset(&self, kind: SourceKind) -> Option<&SourceDataset> {
        self.datasets.iter().find(|d| d.kind() == kind)
    }
}

/// Batch run over a date range: ingest every enabled source, merge, derive features.
pub struct Pipeline<F: Fetch> {
    config: PipelineConfig,
    fetcher: F,
    cancel: CancelFlag,
}

impl<F: Fetch> Pipeline<F> {
    pub fn new(config: PipelineConfig, fetcher: F) -> Self {
        Self {
            config,
            fetcher,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Handle that stops further fetches when cancelled.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    fn ingest_with<A: SourceAdapter>(
        &self,
        adapter: A,
        datasets: &mut Vec<SourceDataset>,
        reports: &mut Vec<IngestReport>,
    ) -> Result<(), PipelineError> {
        let (mut produced, report) = run_adapter(&adapter, &self.config, &self.fetcher, &self.cancel)?;
        datasets.append(&mut produced);
        reports.push(report);
        Ok(())
    }

    /// Run every enabled adapter and clip its datasets to the run range.
    pub fn ingest(&self) -> Result<(Vec<SourceDataset>, Vec<IngestReport>), PipelineError> {
        self.config.validate()?;
        let config = &self.config;
        let mut datasets = Vec::new();
        let mut reports = Vec::new();

        if config.is_enabled(SourceKind::Load) || config.is_enabled(SourceKind::Wind) {
            self.ingest_with(LoadWindAdapter::new(config), &mut datasets, &mut reports)?;
        }
        if config.is_enabled(SourceKind::Lmp) {
            self.ingest_with(LmpAdapter::new(config), &mut datasets, &mut reports)?;
        }
        if config.is_enabled(SourceKind::GenMix) {
            self.ingest_with(GenMixAdapter::new(config), &mut datasets, &mut reports)?;
        }
        if config.is_enabled(SourceKind::DaOffers) {
            self.ingest_with(DaOffersAdapter::new(config), &mut datasets, &mut reports)?;
        }
        if config.is_enabled(SourceKind::GasPrice) {
            self.ingest_with(GasPriceAdapter::new(config), &mut datasets, &mut reports)?;
        }

        let start = midnight(config.start_date);
        let end = midnight(config.end_date) + Duration::days(1);
        let datasets = datasets
            .into_iter()
            .filter(|d| config.is_enabled(d.kind()))
            .map(|d| d.clip(start, end))
            .collect();

        Ok((datasets, reports))
    }

    pub fn run(&self) -> Result<PipelineOutput, PipelineError> {
        let (datasets, reports) = self.ingest()?;

        let mut merged = merge(&datasets, &self.config.iso)?;
        FeatureDeriver::new(self.config.peak_hours).apply(&mut merged);

        Ok(PipelineOutput {
            datasets,
            reports,
            merged,
        })
    }
}
