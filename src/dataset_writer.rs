use anyhow::Result;
use grid_merge::{IngestReport, MergedDataset, SourceDataset};
use log::info;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Persists per-source datasets and the merged table under one output directory.
pub struct DatasetWriter {
    output_dir: PathBuf,
}

impl DatasetWriter {
    pub fn new(output_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(output_dir)?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write `<file_stem>.csv` for one source dataset.
    pub fn write_dataset(&self, dataset: &SourceDataset) -> Result<PathBuf> {
        let mut df = source_frame(dataset)?;
        let csv_path = self
            .output_dir
            .join(format!("{}.csv", dataset.kind().file_stem()));
        CsvWriter::new(File::create(&csv_path)?).finish(&mut df)?;

        info!("Wrote {} rows to {}", df.height(), csv_path.display());
        Ok(csv_path)
    }

    /// Write the merged table as CSV, Parquet and Arrow IPC.
    pub fn write_merged(&self, merged: &MergedDataset) -> Result<Vec<PathBuf>> {
        let mut df = merged_frame(merged)?;
        let base_name = merged.iso.to_lowercase();

        let csv_path = self.output_dir.join(format!("{}.csv", base_name));
        CsvWriter::new(File::create(&csv_path)?).finish(&mut df)?;

        let parquet_path = self.output_dir.join(format!("{}.parquet", base_name));
        ParquetWriter::new(File::create(&parquet_path)?).finish(&mut df)?;

        let arrow_path = self.output_dir.join(format!("{}.arrow", base_name));
        IpcWriter::new(File::create(&arrow_path)?).finish(&mut df)?;

        info!("Wrote merged table: {} rows x {} columns", df.height(), df.width());
        Ok(vec![csv_path, parquet_path, arrow_path])
    }

    pub fn write_reports(&self, reports: &[IngestReport]) -> Result<PathBuf> {
        let path = self.output_dir.join("ingest_report.json");
        serde_json::to_writer_pretty(File::create(&path)?, reports)?;
        Ok(path)
    }
}

fn source_frame(dataset: &SourceDataset) -> Result<DataFrame> {
    let records = dataset.records();
    let mut columns = vec![
        Series::new(
            "timestamp",
            records
                .iter()
                .map(|r| r.timestamp.format(TIMESTAMP_FORMAT).to_string())
                .collect::<Vec<_>>(),
        ),
        Series::new(
            "iso",
            records.iter().map(|r| r.iso.clone()).collect::<Vec<_>>(),
        ),
    ];

    for name in dataset.columns() {
        let values: Vec<Option<f64>> = records.iter().map(|r| r.field(name)).collect();
        columns.push(Series::new(name, values));
    }

    Ok(DataFrame::new(columns)?)
}

fn merged_frame(merged: &MergedDataset) -> Result<DataFrame> {
    let rows = &merged.rows;
    let mut columns = vec![
        Series::new(
            "timestamp",
            rows.iter()
                .map(|r| r.timestamp.format(TIMESTAMP_FORMAT).to_string())
                .collect::<Vec<_>>(),
        ),
        Series::new("iso", vec![merged.iso.clone(); rows.len()]),
    ];

    for (i, name) in merged.columns.iter().enumerate() {
        let values: Vec<Option<f64>> = rows
            .iter()
            .map(|r| r.values.get(i).copied().flatten())
            .collect();
        columns.push(Series::new(name, values));
    }

    if merged.has_features() {
        let features: Vec<_> = rows.iter().map(|r| r.features.unwrap_or_default()).collect();
        columns.push(Series::new(
            "forecast_error",
            features.iter().map(|f| f.forecast_error).collect::<Vec<_>>(),
        ));
        columns.push(Series::new(
            "peak",
            features.iter().map(|f| i32::from(f.peak)).collect::<Vec<_>>(),
        ));
        columns.push(Series::new(
            "wind_share",
            features.iter().map(|f| f.wind_share).collect::<Vec<_>>(),
        ));
    }

    Ok(DataFrame::new(columns)?)
}
