use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_API_BASE: &str = "https://public-api.wordpress.com/rest";
pub const DEFAULT_TOKEN_URL: &str = "https://public-api.wordpress.com/oauth2/token";
pub const DEFAULT_REQUEST_INTERVAL_MS: u64 = 30_000;

/// Run configuration. Every field has a default so an empty document is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct HistoryConfig {
    /// Root of the REST API; version segments are appended per call.
    pub api_base: String,
    /// Minimum delay between two outbound requests.
    pub request_interval_ms: u64,
    /// Directory for the on-disk response cache. No caching when unset.
    pub cache_dir: Option<PathBuf>,
    /// Where the git repository is created. Must not exist yet.
    pub repo_dir: PathBuf,
    /// Identity recorded on every commit; falls back to git's own config.
    pub author: Option<AuthorIdentity>,
    /// OAuth2 token endpoint used for the password grant.
    pub token_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorIdentity {
    pub name: String,
    pub email: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            api_base: DEFAULT_API_BASE.to_owned(),
            request_interval_ms: DEFAULT_REQUEST_INTERVAL_MS,
            cache_dir: None,
            repo_dir: PathBuf::from("repo"),
            author: None,
            token_url: DEFAULT_TOKEN_URL.to_owned(),
        }
    }
}

impl HistoryConfig {
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    pub fn trace_loaded(&self) {
        info!(
            api_base = %self.api_base,
            request_interval_ms = self.request_interval_ms,
            cache_dir = ?self.cache_dir,
            repo_dir = %self.repo_dir.display(),
            "Loaded HistoryConfig"
        );
        debug!(?self, "HistoryConfig loaded (full debug)");
    }
}
