use anyhow::Result;
use chrono::NaiveDate;
use grid_merge::fetch::mirror_file_names;
use grid_merge::{Fetch, FetchError, Pipeline, PipelineConfig, RawPeriodTable};
use std::path::PathBuf;

/// Resolves each address to a file directly under one directory, using the
/// same names a local mirror would hold.
struct FlatDirectory(PathBuf);

impl Fetch for FlatDirectory {
    fn fetch(&self, address: &str) -> Result<RawPeriodTable, FetchError> {
        let path = mirror_file_names(address)
            .into_iter()
            .map(|name| self.0.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| FetchError::NotFound {
                address: address.to_string(),
            })?;
        let bytes = std::fs::read(&path).map_err(|e| FetchError::Io {
            address: address.to_string(),
            message: e.to_string(),
        })?;
        RawPeriodTable::from_bytes(address, &bytes)
    }
}

fn main() -> Result<()> {
    let dir = std::env::args().nth(1).unwrap_or_else(|| "reports".to_string());

    let mut config = PipelineConfig::new(
        NaiveDate::from_ymd_opt(2014, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2014, 1, 7).unwrap(),
    );
    config.as_of = NaiveDate::from_ymd_opt(2015, 6, 1).unwrap();

    let output = Pipeline::new(config, FlatDirectory(PathBuf::from(dir))).run()?;

    println!("Merged {} hours", output.merged.rows.len());
    println!("  Range: {} to {}", output.merged.range.start, output.merged.range.end);
    println!("  Columns: {}", output.merged.columns.len());
    println!("  Gap hours: {}", output.merged.gap_hours);
    for report in &output.reports {
        println!(
            "  {}: {}/{} periods ingested",
            report.adapter,
            report.ingested(),
            report.attempted()
        );
    }

    Ok(())
}
