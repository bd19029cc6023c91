use crate::error::FetchError;
use crate::raw_table::RawPeriodTable;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Retrieval capability consumed by the adapters. No retries happen here.
pub trait Fetch: Sync {
    fn fetch(&self, address: &str) -> Result<RawPeriodTable, FetchError>;
}

impl<F: Fetch + ?Sized> Fetch for &F {
    fn fetch(&self, address: &str) -> Result<RawPeriodTable, FetchError> {
        (**self).fetch(address)
    }
}

/// Shared abort switch, checked before every fetch.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Split `url#sheet` into the resource and the optional sheet name.
pub fn split_sheet(address: &str) -> (&str, Option<&str>) {
    match address.split_once('#') {
        Some((resource, sheet)) if !sheet.is_empty() => (resource, Some(sheet)),
        Some((resource, _)) => (resource, None),
        None => (address, None),
    }
}

/// File names, lower-cased and in order of preference, under which a local
/// mirror may hold the report at `address`.
///
/// The downloaded file itself comes first. Spreadsheet reports may also be
/// kept as per-sheet CSV exports named `<stem>_<sheet>.csv` (or `<stem>.csv`
/// when the address names no sheet).
pub fn mirror_file_names(address: &str) -> Vec<String> {
    let (resource, sheet) = split_sheet(address);
    let file_name = resource.rsplit('/').next().unwrap_or(resource).to_lowercase();
    let (stem, ext) = file_name.rsplit_once('.').unwrap_or((file_name.as_str(), ""));

    if matches!(ext, "csv" | "zip") {
        return vec![file_name.clone()];
    }
    let export = match sheet {
        Some(sheet) => format!("{}_{}.csv", stem, sheet.to_lowercase()),
        None => format!("{}.csv", stem),
    };
    vec![file_name.clone(), export]
}
