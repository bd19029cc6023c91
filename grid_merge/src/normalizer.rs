//! Declarative table layouts and the cell parsers shared by every adapter.
//!
//! A layout names where the header sits, how many footer rows to discard and
//! how each canonical field's column is found. Binding a layout to a fetched
//! table either resolves every column or fails with a schema mismatch; rows
//! are then read field by field.

use crate::error::SchemaMismatchError;
use crate::models::midnight;
use crate::raw_table::RawPeriodTable;
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};

const MISSING_MARKERS: [&str; 4] = ["", "NA", "N/A", "-"];

const DATE_FORMATS: [&str; 5] = ["%m/%d/%Y", "%Y-%m-%d", "%Y%m%d", "%b %d, %Y", "%d-%b-%Y"];

const DATETIME_FORMATS: [&str; 8] = [
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y%m%d %H:%M",
];

/// How a column is found in a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locate {
    /// Fixed position, header not checked.
    At(usize),
    /// Fixed position whose header must start with the label.
    Labeled(usize, &'static str),
    /// First header cell equal to the label.
    Header(&'static str),
    /// Header cell equal to the label inside `[start, end)`.
    HeaderWithin(&'static str, usize, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub field: &'static str,
    pub locate: Locate,
}

impl ColumnSpec {
    pub const fn at(field: &'static str, position: usize) -> Self {
        Self {
            field,
            locate: Locate::At(position),
        }
    }

    pub const fn labeled(field: &'static str, position: usize, label: &'static str) -> Self {
        Self {
            field,
            locate: Locate::Labeled(position, label),
        }
    }

    pub const fn header(field: &'static str, label: &'static str) -> Self {
        Self {
            field,
            locate: Locate::Header(label),
        }
    }

    pub const fn header_within(
        field: &'static str,
        label: &'static str,
        start: usize,
        end: usize,
    ) -> Self {
        Self {
            field,
            locate: Locate::HeaderWithin(label, start, end),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLayout {
    pub name: &'static str,
    /// Zero-based row holding the column labels; `None` for headerless sheets.
    pub header_row: Option<usize>,
    pub footer_rows: usize,
    pub columns: &'static [ColumnSpec],
}

impl TableLayout {
    pub fn bind<'a>(&self, table: &'a RawPeriodTable) -> Result<BoundTable<'a>, SchemaMismatchError> {
        let header: &'a [String] = match self.header_row {
            Some(row) => table.rows.get(row).map(Vec::as_slice).ok_or_else(|| {
                SchemaMismatchError::new(
                    self.name,
                    format!("expected header at row {}, table has {} rows", row, table.height()),
                )
            })?,
            None => &[],
        };
        let normalized: Vec<String> = header.iter().map(|h| normalize_label(h)).collect();
        let width = table.width();

        let mut positions = Vec::with_capacity(self.columns.len());
        for spec in self.columns {
            let position = match spec.locate {
                Locate::At(pos) => (pos < width).then_some(pos).ok_or_else(|| {
                    self.mismatch(format!("column {} ({}) beyond table width {}", pos, spec.field, width))
                })?,
                Locate::Labeled(pos, label) => {
                    if self.header_row.is_some() {
                        let wanted = normalize_label(label);
                        match normalized.get(pos) {
                            Some(found) if found.starts_with(&wanted) => pos,
                            Some(found) => {
                                return Err(self.mismatch(format!(
                                    "column {} is '{}', expected '{}'",
                                    pos, found, label
                                )))
                            }
                            None => {
                                return Err(self.mismatch(format!(
                                    "header has no column {} for '{}'",
                                    pos, label
                                )))
                            }
                        }
                    } else if pos < width {
                        pos
                    } else {
                        return Err(self.mismatch(format!(
                            "column {} ({}) beyond table width {}",
                            pos, spec.field, width
                        )));
                    }
                }
                Locate::Header(label) => find_label(&normalized, label, 0, normalized.len())
                    .ok_or_else(|| self.mismatch(format!("no '{}' column", label)))?,
                Locate::HeaderWithin(label, start, end) => find_label(&normalized, label, start, end)
                    .ok_or_else(|| {
                        self.mismatch(format!("no '{}' column within positions {}..{}", label, start, end))
                    })?,
            };
            positions.push((spec.field, position));
        }

        let first = self.header_row.map_or(0, |row| row + 1);
        let last = table.height().saturating_sub(self.footer_rows).max(first);
        let rows = table.rows.get(first..last).unwrap_or(&[]);

        Ok(BoundTable {
            layout: self.name,
            header,
            normalized,
            positions,
            rows,
        })
    }

    fn mismatch(&self, detail: String) -> SchemaMismatchError {
        SchemaMismatchError::new(self.name, detail)
    }
}

fn find_label(normalized: &[String], label: &str, start: usize, end: usize) -> Option<usize> {
    let wanted = normalize_label(label);
    let end = end.min(normalized.len());
    if start >= end {
        return None;
    }
    normalized[start..end]
        .iter()
        .position(|h| *h == wanted)
        .map(|offset| start + offset)
}

/// Lower case with runs of whitespace collapsed to one space.
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A table whose columns have been resolved against a layout.
#[derive(Debug)]
pub struct BoundTable<'a> {
    layout: &'static str,
    header: &'a [String],
    normalized: Vec<String>,
    positions: Vec<(&'static str, usize)>,
    rows: &'a [Vec<String>],
}

impl<'a> BoundTable<'a> {
    pub fn layout(&self) -> &'static str {
        self.layout
    }

    pub fn header(&self) -> &'a [String] {
        self.header
    }

    /// Position of an optional column not declared in the layout.
    pub fn find_header(&self, label: &str) -> Option<usize> {
        find_label(&self.normalized, label, 0, self.normalized.len())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = BoundRow<'_>> + '_ {
        self.rows.iter().map(move |cells| BoundRow {
            cells,
            positions: &self.positions,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BoundRow<'a> {
    cells: &'a [String],
    positions: &'a [(&'static str, usize)],
}

impl<'a> BoundRow<'a> {
    /// Cell of a declared field, `None` when absent or a missing marker.
    pub fn get(&self, field: &str) -> Option<&'a str> {
        let pos = self
            .positions
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, pos)| *pos)?;
        self.cell(pos)
    }

    pub fn cell(&self, position: usize) -> Option<&'a str> {
        let value = self.cells.get(position)?.as_str();
        (!is_missing(value)).then_some(value)
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(parse_number)
    }

    pub fn number_at(&self, position: usize) -> Option<f64> {
        self.cell(position).and_then(parse_number)
    }
}

pub fn is_missing(value: &str) -> bool {
    let value = value.trim();
    MISSING_MARKERS.iter().any(|m| value.eq_ignore_ascii_case(m))
}

pub fn parse_number(value: &str) -> Option<f64> {
    if is_missing(value) {
        return None;
    }
    let cleaned: String = value
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '$')
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Hour-ending value 1..=24, written as an integer or an integral float.
pub fn parse_hour_ending(value: &str) -> Option<u32> {
    let hour = parse_number(value)?;
    if hour.fract() != 0.0 || !(1.0..=24.0).contains(&hour) {
        return None;
    }
    Some(hour as u32)
}

/// Hour-ending `he` of `date` as an hour-starting timestamp.
pub fn hour_starting(date: NaiveDate, hour_ending: u32) -> NaiveDateTime {
    midnight(date) + Duration::hours(i64::from(hour_ending) - 1)
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Some(ts.date());
        }
    }
    excel_serial_date(value)
}

/// Hour-aligned timestamp; times off the hour are rejected.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    let parsed = DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| parse_date(value).map(midnight))?;
    (parsed.minute() == 0 && parsed.second() == 0 && parsed.nanosecond() == 0).then_some(parsed)
}

/// Spreadsheet exports sometimes leave dates as day serials (1900 system).
fn excel_serial_date(value: &str) -> Option<NaiveDate> {
    let serial = value.parse::<f64>().ok()?;
    if serial.fract() != 0.0 || !(1.0..100_000.0).contains(&serial) {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_signed(Duration::days(serial as i64))
}

/// Debug trace for rows discarded while normalizing one table.
pub fn log_dropped_rows(layout: &str, address: &str, dropped: usize) {
    if dropped > 0 {
        log::debug!("{}: dropped {} rows with missing fields from {}", layout, dropped, address);
    }
}
