use crate::error::PipelineError;
use crate::models::{Period, SourceKind};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_MISO_BASE_URL: &str =
    "https://www.misoenergy.org/Library/Repository/Market%20Reports/";
pub const DEFAULT_GAS_PRICE_URL: &str = "http://www.eia.gov/dnav/ng/hist_xls/RNGWHHDd.xls#Data 1";
pub const DEFAULT_ISO: &str = "MISO";

/// What to do with a technology or fuel label outside the known vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnknownCategoryPolicy {
    /// Keep the raw label as its own column group.
    #[default]
    PassThrough,
    Drop,
    /// Fold every unknown label into one `Unknown` category.
    Bucket,
}

impl FromStr for UnknownCategoryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pass-through" | "passthrough" => Ok(Self::PassThrough),
            "drop" => Ok(Self::Drop),
            "bucket" => Ok(Self::Bucket),
            other => Err(format!(
                "unknown category policy '{}' (expected pass-through, drop or bucket)",
                other
            )),
        }
    }
}

/// Peak window as hour-of-day bounds, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakHours {
    pub start: u32,
    pub end: u32,
}

impl Default for PeakHours {
    fn default() -> Self {
        Self { start: 6, end: 22 }
    }
}

impl PeakHours {
    pub fn contains(&self, hour: u32) -> bool {
        hour >= self.start && hour < self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Report date used for the current year's annual files.
    pub as_of: NaiveDate,
    pub output_dir: PathBuf,
    pub iso: String,
    pub miso_base_url: String,
    pub gas_price_url: String,
    pub disabled_sources: Vec<SourceKind>,
    pub unknown_categories: UnknownCategoryPolicy,
    pub peak_hours: PeakHours,
    pub parallel_fetch: bool,
    pub show_progress: bool,
}

impl PipelineConfig {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            as_of: Local::now().date_naive(),
            output_dir: PathBuf::from("data"),
            iso: DEFAULT_ISO.to_string(),
            miso_base_url: DEFAULT_MISO_BASE_URL.to_string(),
            gas_price_url: DEFAULT_GAS_PRICE_URL.to_string(),
            disabled_sources: Vec::new(),
            unknown_categories: UnknownCategoryPolicy::default(),
            peak_hours: PeakHours::default(),
            parallel_fetch: false,
            show_progress: true,
        }
    }

    pub fn is_enabled(&self, kind: SourceKind) -> bool {
        !self.disabled_sources.contains(&kind)
    }

    pub fn enabled_sources(&self) -> Vec<SourceKind> {
        SourceKind::ALL
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .collect()
    }

    pub fn days(&self) -> Vec<Period> {
        Period::days(self.start_date, self.end_date)
    }

    pub fn years(&self) -> Vec<Period> {
        Period::years(self.start_date, self.end_date)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.start_date > self.end_date {
            return Err(PipelineError::InvalidConfig(format!(
                "start date {} is after end date {}",
                self.start_date, self.end_date
            )));
        }
        if self.peak_hours.start >= self.peak_hours.end || self.peak_hours.end > 24 {
            return Err(PipelineError::InvalidConfig(format!(
                "peak window {}..{} is not a valid hour range",
                self.peak_hours.start, self.peak_hours.end
            )));
        }
        if self.enabled_sources().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "every source is disabled".to_string(),
            ));
        }
        if self.iso.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("iso identifier is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::new(day(2014, 1, 1), day(2014, 1, 3));
        assert_eq!(config.iso, "MISO");
        assert_eq!(config.peak_hours, PeakHours { start: 6, end: 22 });
        assert_eq!(config.enabled_sources().len(), 6);
        assert_eq!(config.days().len(), 3);
        assert_eq!(config.years().len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = PipelineConfig::new(day(2014, 1, 3), day(2014, 1, 1));
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(_))));

        config.end_date = day(2014, 2, 1);
        config.peak_hours = PeakHours { start: 22, end: 6 };
        assert!(config.validate().is_err());

        config.peak_hours = PeakHours::default();
        config.disabled_sources = SourceKind::ALL.to_vec();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("drop".parse::<UnknownCategoryPolicy>(), Ok(UnknownCategoryPolicy::Drop));
        assert_eq!(
            "Pass-Through".parse::<UnknownCategoryPolicy>(),
            Ok(UnknownCategoryPolicy::PassThrough)
        );
        assert!("ignore".parse::<UnknownCategoryPolicy>().is_err());
    }

    #[test]
    fn test_peak_window_bounds() {
        let peak = PeakHours::default();
        assert!(!peak.contains(5));
        assert!(peak.contains(6));
        assert!(peak.contains(21));
        assert!(!peak.contains(22));
    }
}
