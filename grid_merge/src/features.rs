use crate::config::PeakHours;
use crate::models::{DerivedFeatures, MergedDataset};
use chrono::Timelike;

pub fn forecast_error(forecast_load: Option<f64>, actual_load: Option<f64>) -> Option<f64> {
    Some(forecast_load? - actual_load?)
}

/// Wind generation as a share of actual load; null on a zero load.
pub fn wind_share(wind_mwh: Option<f64>, actual_load: Option<f64>) -> Option<f64> {
    let load = actual_load?;
    if load == 0.0 {
        return None;
    }
    Some(wind_mwh? / load)
}

pub fn peak_flag(peak_hours: &PeakHours, hour: u32) -> u8 {
    u8::from(peak_hours.contains(hour))
}

/// Row-local features computed on the merged table.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureDeriver {
    peak_hours: PeakHours,
}

impl FeatureDeriver {
    pub fn new(peak_hours: PeakHours) -> Self {
        Self { peak_hours }
    }

    pub fn apply(&self, merged: &mut MergedDataset) {
        let forecast = merged.column_index("forecast_load");
        let actual = merged.column_index("actual_load");
        let wind = merged.column_index("wind_mwh");

        for row in &mut merged.rows {
            let value = |idx: Option<usize>| idx.and_then(|i| row.values.get(i).copied().flatten());
            let features = DerivedFeatures {
                forecast_error: forecast_error(value(forecast), value(actual)),
                peak: peak_flag(&self.peak_hours, row.timestamp.hour()),
                wind_share: wind_share(value(wind), value(actual)),
            };
            row.features = Some(features);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MergedRow, ValidRange};
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2014, 1, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn merged(columns: &[&str], rows: Vec<(u32, Vec<Option<f64>>)>) -> MergedDataset {
        MergedDataset {
            iso: "MISO".into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .into_iter()
                .map(|(h, values)| MergedRow {
                    timestamp: at(h),
                    values,
                    features: None,
                })
                .collect(),
            range: ValidRange {
                start: at(0),
                end: at(23),
            },
            gap_hours: 0,
        }
    }

    #[test]
    fn test_row_features() {
        let mut ds = merged(
            &["forecast_load", "actual_load", "wind_mwh"],
            vec![
                (5, vec![Some(110.0), Some(100.0), Some(25.0)]),
                (6, vec![Some(90.0), Some(0.0), Some(25.0)]),
                (21, vec![None, Some(50.0), None]),
                (22, vec![Some(1.0), Some(2.0), Some(1.0)]),
            ],
        );
        FeatureDeriver::new(PeakHours::default()).apply(&mut ds);
        assert!(ds.has_features());

        let f: Vec<DerivedFeatures> = ds.rows.iter().filter_map(|r| r.features).collect();
        assert_eq!(f[0].forecast_error, Some(10.0));
        assert_eq!(f[0].wind_share, Some(0.25));
        assert_eq!(f[0].peak, 0);
        assert_eq!(f[1].wind_share, None);
        assert_eq!(f[1].peak, 1);
        assert_eq!(f[2].forecast_error, None);
        assert_eq!(f[2].peak, 1);
        assert_eq!(f[3].peak, 0);
    }

    #[test]
    fn test_absent_columns_give_null_features() {
        let mut ds = merged(&["lmp"], vec![(12, vec![Some(30.0)])]);
        FeatureDeriver::new(PeakHours { start: 0, end: 24 }).apply(&mut ds);
        let features = ds.rows[0].features.unwrap();
        assert_eq!(features.forecast_error, None);
        assert_eq!(features.wind_share, None);
        assert_eq!(features.peak, 1);
    }
}
