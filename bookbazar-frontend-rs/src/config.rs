use std::{path::Path, path::PathBuf, time::Duration};

use crate::coupons::CouponTable;

const DEFAULT_API_BASE_URL: &str = "http://localhost:5001/api";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_PUSH_RETRIES: usize = 1;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendConfig {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    /// Extra attempts for a failed push. Pulls are never retried.
    pub push_retries: usize,
    pub coupons: CouponTable,
    /// Where to mirror cart and wishlist snapshots between runs. `None` disables the cache.
    pub cache_dir: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            push_retries: DEFAULT_PUSH_RETRIES,
            coupons: CouponTable::default(),
            cache_dir: None,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Missing keys fall back to the defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .inspect_err(|e| log::error!("Error reading config {path:?}: {e}"))?;
        let config = serde_json::from_str(&text)
            .inspect_err(|e| log::error!("Error parsing config {path:?}: {e}"))?;
        Ok(config)
    }

    /// Defaults overridden by `BOOKBAZAR_API_URL`, `BOOKBAZAR_TIMEOUT_MS` and `BOOKBAZAR_CACHE_DIR`.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = var("BOOKBAZAR_API_URL") {
            self.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(timeout) = var("BOOKBAZAR_TIMEOUT_MS") {
            match timeout.parse() {
                Ok(ms) => self.request_timeout_ms = ms,
                Err(e) => log::warn!("Ignoring BOOKBAZAR_TIMEOUT_MS={timeout}: {e}"),
            }
        }
        if let Some(dir) = var("BOOKBAZAR_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        self
    }
}
