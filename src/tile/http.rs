use anyhow::{bail, Context, Result};
use std::time::Duration;

/// Minimal blocking HTTP capability injected into network tile providers
pub trait HttpClient {
    /// GET `url` and return the body; non-2xx statuses are errors
    fn get(&self, url: &str) -> Result<Vec<u8>>;
}

/// reqwest-backed client, built once at start-up and dropped at shutdown
pub struct ReqwestClient {
    inner: reqwest::blocking::Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        let inner = reqwest::blocking::Client::builder()
            .user_agent(concat!("riverseg/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { inner })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.inner.get(url).send().context("HTTP request failed")?;

        if !resp.status().is_success() {
            bail!("HTTP error: {}", resp.status());
        }

        let bytes = resp.bytes().context("Failed to read response body")?;
        Ok(bytes.to_vec())
    }
}
