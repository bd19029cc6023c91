use crate::error::FetchError;
use crate::fetch::split_sheet;
use crate::workbook;
use csv::ReaderBuilder;
use std::io::{Cursor, Read};
use zip::ZipArchive;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Untyped grid of trimmed string cells for one fetched report.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawPeriodTable {
    pub address: String,
    pub rows: Vec<Vec<String>>,
}

impl RawPeriodTable {
    pub fn new(address: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            address: address.into(),
            rows,
        }
    }

    /// Read every record of a headerless, ragged CSV stream.
    pub fn from_csv_reader<R: Read>(address: &str, reader: R) -> Result<Self, FetchError> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record.map_err(|e| FetchError::Malformed {
                address: address.to_string(),
                message: e.to_string(),
            })?;
            rows.push(record.iter().map(|cell| cell.trim().to_string()).collect());
        }

        Ok(Self::new(address, rows))
    }

    /// Parse a fetched payload: a spreadsheet, plain CSV, or a zip archive
    /// holding CSV entries.
    ///
    /// Spreadsheets and archives both honour the address' `#sheet` fragment.
    /// For archives the entry named after it wins, otherwise the first `.csv`
    /// entry is used.
    pub fn from_bytes(address: &str, bytes: &[u8]) -> Result<Self, FetchError> {
        if workbook::is_legacy_workbook(bytes) {
            return Ok(Self::new(address, workbook::read_sheet(address, bytes)?));
        }
        if !bytes.starts_with(ZIP_MAGIC) {
            return Self::from_csv_reader(address, bytes);
        }

        let malformed = |message: String| FetchError::Malformed {
            address: address.to_string(),
            message,
        };

        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| malformed(e.to_string()))?;
        if archive.by_name("xl/workbook.xml").is_ok() {
            return Ok(Self::new(address, workbook::read_sheet(address, bytes)?));
        }
        let (_, sheet) = split_sheet(address);

        let mut chosen: Option<usize> = None;
        for i in 0..archive.len() {
            let entry = archive.by_index(i).map_err(|e| malformed(e.to_string()))?;
            if !entry.is_file() || !entry.name().to_ascii_lowercase().ends_with(".csv") {
                continue;
            }
            let stem = entry
                .name()
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .trim_end_matches(".csv")
                .trim_end_matches(".CSV")
                .to_string();
            match sheet {
                Some(wanted) if stem.eq_ignore_ascii_case(wanted) => {
                    chosen = Some(i);
                    break;
                }
                _ if chosen.is_none() => chosen = Some(i),
                _ => {}
            }
        }

        let index = chosen.ok_or_else(|| malformed("archive contains no CSV entry".to_string()))?;
        let mut contents = Vec::new();
        archive
            .by_index(index)
            .map_err(|e| malformed(e.to_string()))?
            .read_to_end(&mut contents)
            .map_err(|e| FetchError::Io {
                address: address.to_string(),
                message: e.to_string(),
            })?;

        Self::from_csv_reader(address, contents.as_slice())
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Widest row.
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::CompressionMethod;

    fn zipped(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options = FileOptions::default().compression_method(CompressionMethod::Stored);
            for (name, content) in entries {
                zip.start_file(*name, options).unwrap();
                zip.write_all(content.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn test_plain_csv_is_ragged_and_trimmed() {
        let body = "Report title\n\n Date , HE ,Value\n01/01/2014,1, 12.5\n";
        let table = RawPeriodTable::from_bytes("a.csv", body.as_bytes()).unwrap();
        assert_eq!(table.height(), 3);
        assert_eq!(table.width(), 3);
        assert_eq!(table.cell(1, 0), Some("Date"));
        assert_eq!(table.cell(2, 2), Some("12.5"));
        assert_eq!(table.cell(0, 2), None);
    }

    #[test]
    fn test_zip_payload_picks_sheet_entry() {
        let bytes = zipped(&[("2014.csv", "a,b\n1,2\n"), ("2014(1).csv", "3,4\n")]);
        let first = RawPeriodTable::from_bytes("wb.xls", &bytes).unwrap();
        assert_eq!(first.rows, vec![vec!["a", "b"], vec!["1", "2"]]);

        let continuation = RawPeriodTable::from_bytes("wb.xls#2014(1)", &bytes).unwrap();
        assert_eq!(continuation.rows, vec![vec!["3", "4"]]);
        assert_eq!(continuation.address, "wb.xls#2014(1)");
    }

    #[test]
    fn test_xlsx_payload_reads_sheet() {
        let mut book = rust_xlsxwriter::Workbook::new();
        let sheet = book.add_worksheet().set_name("2014(1)").unwrap();
        sheet.write_string(0, 0, "2014-01-01").unwrap();
        sheet.write_number(0, 1, 1.0).unwrap();
        sheet.write_string(0, 2, "COAL").unwrap();
        let bytes = book.save_to_buffer().unwrap();

        let table = RawPeriodTable::from_bytes("wb.xlsx#2014(1)", &bytes).unwrap();
        assert_eq!(table.rows, vec![vec!["2014-01-01", "1", "COAL"]]);
        assert_eq!(table.address, "wb.xlsx#2014(1)");
    }

    #[test]
    fn test_zip_without_csv_is_malformed() {
        let bytes = zipped(&[("readme.txt", "nothing")]);
        let err = RawPeriodTable::from_bytes("x.zip", &bytes).unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
    }
}
