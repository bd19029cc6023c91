//! Spreadsheet payloads (legacy `.xls` and `.xlsx`) read into raw tables.

use crate::error::FetchError;
use crate::fetch::split_sheet;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;

/// Compound-document header of legacy binary `.xls` workbooks.
pub const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

pub fn is_legacy_workbook(bytes: &[u8]) -> bool {
    bytes.starts_with(OLE_MAGIC)
}

/// Cell text as a CSV export of the sheet would show it. Date cells become
/// day serials, which the date parser understands.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
    }
}

/// Read the sheet named by the address' `#sheet` fragment, or the first sheet.
///
/// Rows and columns keep their absolute sheet positions: leading blank rows
/// and columns are padded back in.
pub fn read_sheet(address: &str, bytes: &[u8]) -> Result<Vec<Vec<String>>, FetchError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(|e| {
        FetchError::UnsupportedFormat {
            address: address.to_string(),
            detail: e.to_string(),
        }
    })?;

    let names = workbook.sheet_names().to_vec();
    let name = match split_sheet(address).1 {
        Some(wanted) => names.iter().find(|n| n.trim().eq_ignore_ascii_case(wanted.trim())),
        None => names.first(),
    }
    .cloned()
    .ok_or_else(|| FetchError::NotFound {
        address: address.to_string(),
    })?;

    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| FetchError::Malformed {
            address: address.to_string(),
            message: e.to_string(),
        })?;

    let (first_row, first_col) = match range.start() {
        Some((row, col)) => (row as usize, col as usize),
        None => return Ok(Vec::new()),
    };

    let mut rows = vec![Vec::new(); first_row];
    for cells in range.rows() {
        let mut row = vec![String::new(); first_col];
        row.extend(cells.iter().map(cell_text));
        while row.last().is_some_and(String::is_empty) {
            row.pop();
        }
        rows.push(row);
    }
    Ok(rows)
}
