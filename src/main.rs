use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use grid_merge::{
    Fetch, Pipeline, PipelineConfig, PipelineOutput, SourceKind, UnknownCategoryPolicy,
};
use log::{info, warn};
use std::path::PathBuf;
use std::time::{Duration, Instant};

mod dataset_writer;
mod http_fetcher;
mod mirror_fetcher;

use dataset_writer::DatasetWriter;
use http_fetcher::HttpFetcher;
use mirror_fetcher::MirrorFetcher;

#[derive(Parser)]
#[command(name = "miso_pipeline")]
#[command(about = "Fetch MISO market reports and EIA gas prices and merge them into one hourly table")]
struct Args {
    /// First day to include (YYYY-MM-DD)
    #[arg(long)]
    start_date: String,

    /// Last day to include (YYYY-MM-DD)
    #[arg(long)]
    end_date: String,

    /// Directory for per-source and merged output files
    #[arg(short, long, default_value = "data")]
    output_dir: PathBuf,

    /// Report date for the current year's annual files (defaults to today)
    #[arg(long)]
    as_of: Option<String>,

    /// Read reports from a local mirror instead of downloading them
    #[arg(long)]
    mirror_dir: Option<PathBuf>,

    /// Base URL of the MISO market report repository
    #[arg(long)]
    miso_base_url: Option<String>,

    /// Address of the EIA Henry Hub daily price sheet
    #[arg(long)]
    gas_url: Option<String>,

    /// Skip a source (load, wind, lmp, gen_mix, da_offers, gas_price); repeatable
    #[arg(long = "disable")]
    disabled: Vec<SourceKind>,

    /// Handling of unknown technology/fuel labels (pass-through, drop, bucket)
    #[arg(long, default_value = "pass-through")]
    unknown_categories: UnknownCategoryPolicy,

    /// First hour of the peak window
    #[arg(long, default_value = "6")]
    peak_start: u32,

    /// Hour the peak window ends (exclusive)
    #[arg(long, default_value = "22")]
    peak_end: u32,

    /// Fetch periods in parallel
    #[arg(long)]
    parallel: bool,

    /// HTTP timeout in seconds
    #[arg(long, default_value = "60")]
    timeout_secs: u64,

    /// Hide progress bars
    #[arg(long)]
    no_progress: bool,
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", value))
}

fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::new(parse_date(&args.start_date)?, parse_date(&args.end_date)?);
    if let Some(as_of) = &args.as_of {
        config.as_of = parse_date(as_of)?;
    }
    if let Some(url) = &args.miso_base_url {
        config.miso_base_url = url.clone();
    }
    if let Some(url) = &args.gas_url {
        config.gas_price_url = url.clone();
    }
    config.output_dir = args.output_dir.clone();
    config.disabled_sources = args.disabled.clone();
    config.unknown_categories = args.unknown_categories;
    config.peak_hours.start = args.peak_start;
    config.peak_hours.end = args.peak_end;
    config.parallel_fetch = args.parallel;
    config.show_progress = !args.no_progress;
    config.validate()?;
    Ok(config)
}

fn run_with<F: Fetch>(config: PipelineConfig, fetcher: F) -> Result<PipelineOutput> {
    Ok(Pipeline::new(config, fetcher).run()?)
}

fn print_summary(output: &PipelineOutput) {
    println!("\n📋 Ingest summary");
    println!("{}", "=".repeat(60));
    for report in &output.reports {
        println!(
            "  {:<10} {:>5}/{:<5} periods ingested ({} fetch failures, {} schema mismatches)",
            report.adapter,
            report.ingested(),
            report.attempted(),
            report.fetch_failures(),
            report.schema_mismatches()
        );
        for skipped in report.skipped().take(5) {
            println!("    ⚠️  {}: {:?}", skipped.address, skipped.status);
        }
    }

    println!("\n📊 Source datasets");
    for kind in SourceKind::ALL {
        match output.dataset(kind) {
            Some(dataset) => println!("  {:<10} {:>7} records", kind, dataset.len()),
            None => println!("  {:<10} {:>7}", kind, "-"),
        }
    }

    let merged = &output.merged;
    println!("\n🔗 Merged table");
    println!("  Range:     {} to {}", merged.range.start, merged.range.end);
    println!("  Rows:      {}", merged.rows.len());
    println!("  Columns:   {}", merged.columns.len());
    println!("  Gap hours: {}", merged.gap_hours);
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    rayon::ThreadPoolBuilder::new()
        .num_threads(num_cpus::get())
        .build_global()
        .context("failed to build thread pool")?;

    let config = build_config(&args)?;

    println!("🚀 MISO Market Data Pipeline");
    println!("{}", "=".repeat(60));
    println!("📅 {} to {}", config.start_date, config.end_date);
    println!("📁 Output: {}", config.output_dir.display());

    let start = Instant::now();
    let output = match &args.mirror_dir {
        Some(dir) => {
            let fetcher = MirrorFetcher::new(dir)?;
            info!("Indexed {} mirrored files in {}", fetcher.len(), dir.display());
            if fetcher.is_empty() {
                warn!("Mirror directory {} is empty", dir.display());
            }
            run_with(config.clone(), fetcher)?
        }
        None => run_with(
            config.clone(),
            HttpFetcher::new(Duration::from_secs(args.timeout_secs))?,
        )?,
    };

    print_summary(&output);

    let writer = DatasetWriter::new(&config.output_dir)?;
    for dataset in &output.datasets {
        writer.write_dataset(dataset)?;
    }
    writer.write_merged(&output.merged)?;
    writer.write_reports(&output.reports)?;

    println!("\n{}", "=".repeat(60));
    println!("✅ Done in {:.1}s. Files written to {}", start.elapsed().as_secs_f64(), writer.output_dir().display());

    Ok(())
}
