use crate::config::ResolverConfig;
use crate::error::{Result, VastError};
use log::{info, warn};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::future::Future;
use std::time::{Duration, Instant};
use url::Url;

/// Retrieves the text of a VAST document
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<String>> + Send;
}

/// Fetches documents over HTTP(S), or from disk for `file://` URLs
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// A fetcher using the configured per-request timeout
    pub fn from_config(config: &ResolverConfig) -> Result<Self> {
        Self::new(config.request_timeout())
    }

    async fn fetch_from_url(&self, url: &Url) -> Result<String> {
        // Random request ID for tracking in logs
        let req_id: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(char::from)
            .collect();

        info!("[{}] Fetching from URL: {}", req_id, url);
        let start_time = Instant::now();

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            warn!("[{}] Request failed after {:?}: {}", req_id, start_time.elapsed(), e);
            VastError::HttpError(e)
        })?;

        info!("[{}] Received response in {:?}", req_id, start_time.elapsed());

        let status = response.status();
        if !status.is_success() {
            warn!("[{}] Unexpected HTTP status {}", req_id, status);
            return Err(VastError::HttpStatus(status.as_u16()));
        }

        let xml_content = response.text().await?;

        info!("[{}] Total request completed in {:?}", req_id, start_time.elapsed());

        Ok(xml_content)
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<String> {
        if url.scheme() == "file" {
            let path = url
                .to_file_path()
                .map_err(|_| VastError::MissingField(format!("file path in {}", url)))?;
            info!("Reading from file: {}", path.display());
            return Ok(tokio::fs::read_to_string(path).await?);
        }

        self.fetch_from_url(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_file_urls() {
        let path = std::env::temp_dir().join(format!("vast-resolver-fetch-{}.xml", std::process::id()));
        tokio::fs::write(&path, "<VAST/>").await.unwrap();

        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();
        let url = Url::from_file_path(&path).unwrap();
        assert_eq!(fetcher.fetch(&url).await.unwrap(), "<VAST/>");

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let fetcher = HttpFetcher::from_config(&ResolverConfig::default()).unwrap();
        let url = Url::from_file_path(std::env::temp_dir().join("vast-resolver-does-not-exist.xml")).unwrap();
        assert!(matches!(fetcher.fetch(&url).await, Err(VastError::IoError(_))));
    }
}
