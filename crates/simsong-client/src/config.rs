//! Prediction client configuration.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{PredictError, PredictResult};

const DEFAULT_ENDPOINT: &str = "http://localhost:8080/predict";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for [`PredictionClient`](crate::PredictionClient).
#[derive(Debug, Clone)]
pub struct PredictConfig {
    /// Prediction endpoint (full URL, no templating)
    pub endpoint: Url,
    /// Time allowed to establish the connection
    pub connect_timeout: Duration,
    /// Longest the upload may go without handing over another chunk
    pub write_timeout: Duration,
    /// Longest wait for the response head after the upload, and between body reads
    pub read_timeout: Duration,
    /// Directory for staging copies; OS temp dir when unset
    pub staging_dir: Option<PathBuf>,
    /// User-Agent header
    pub user_agent: String,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            endpoint: Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is a valid URL"),
            connect_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            write_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            staging_dir: None,
            user_agent: concat!("simsong-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl PredictConfig {
    /// Create a config for `endpoint` with default timeouts.
    pub fn new(endpoint: &str) -> PredictResult<Self> {
        Ok(Self {
            endpoint: parse_endpoint(endpoint)?,
            ..Self::default()
        })
    }

    /// Create config from environment variables.
    pub fn from_env() -> PredictResult<Self> {
        let endpoint = match std::env::var("SIMSONG_API_URL") {
            Ok(raw) if !raw.trim().is_empty() => parse_endpoint(raw.trim())?,
            _ => parse_endpoint(DEFAULT_ENDPOINT)?,
        };

        let staging_dir = std::env::var("SIMSONG_STAGING_DIR")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            endpoint,
            connect_timeout: secs_from_env("SIMSONG_CONNECT_TIMEOUT_SECS"),
            write_timeout: secs_from_env("SIMSONG_WRITE_TIMEOUT_SECS"),
            read_timeout: secs_from_env("SIMSONG_READ_TIMEOUT_SECS"),
            staging_dir,
            ..Self::default()
        })
    }

    /// Apply the same bound to every phase.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self.write_timeout = timeout;
        self.read_timeout = timeout;
        self
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }
}

fn parse_endpoint(raw: &str) -> PredictResult<Url> {
    let url = Url::parse(raw)
        .map_err(|e| PredictError::config(format!("invalid endpoint {:?}: {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(PredictError::config(format!(
            "unsupported endpoint scheme {:?}",
            other
        ))),
    }
}

fn secs_from_env(var: &str) -> Duration {
    Duration::from_secs(
        std::env::var(var)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS),
    )
}
