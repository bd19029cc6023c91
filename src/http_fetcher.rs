use grid_merge::fetch::split_sheet;
use grid_merge::{Fetch, FetchError, RawPeriodTable};
use log::debug;
use reqwest::StatusCode;
use std::time::Duration;

/// Blocking HTTP retrieval of published reports. One GET per address, no retries.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("miso_pipeline/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

/// Map a response status to the fetch outcome for `address`.
pub fn check_status(address: &str, status: StatusCode) -> Result<(), FetchError> {
    if status == StatusCode::NOT_FOUND {
        return Err(FetchError::NotFound {
            address: address.to_string(),
        });
    }
    if !status.is_success() {
        return Err(FetchError::Http {
            address: address.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(())
}

impl Fetch for HttpFetcher {
    fn fetch(&self, address: &str) -> Result<RawPeriodTable, FetchError> {
        let (url, _) = split_sheet(address);
        debug!("GET {}", url);

        let network = |e: reqwest::Error| FetchError::Network {
            address: address.to_string(),
            message: e.to_string(),
        };

        let resp = self.client.get(url).send().map_err(network)?;
        check_status(address, resp.status())?;
        let bytes = resp.bytes().map_err(network)?;

        RawPeriodTable::from_bytes(address, &bytes)
    }
}
