//! Explicit configuration objects.
//!
//! Nothing below the binary reads the environment; `main.rs` resolves flags and
//! env fallbacks once and hands these structs down.

use crate::error::{ProfilesError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Default search service endpoint
pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://serpapi.com/search";

/// Institution appended to department queries and used as the export org label
pub const DEFAULT_AFFILIATION_HINT: &str = "Catholic University of America";

/// Per-request deadline on the transport call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Search client configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// API key credential
    pub api_key: String,
    /// Search endpoint URL
    pub endpoint: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Institution name appended to fallback queries
    pub affiliation_hint: String,
}

impl SearchConfig {
    /// Build a config from an optional key. A missing or blank key is a
    /// configuration error and aborts before any request is attempted.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        let config = Self {
            api_key: api_key.unwrap_or_default(),
            endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            affiliation_hint: DEFAULT_AFFILIATION_HINT.to_string(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Override the endpoint (mirrors, mock servers)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Override the institution hint
    pub fn with_affiliation_hint(mut self, hint: impl Into<String>) -> Self {
        self.affiliation_hint = hint.into();
        self
    }

    /// Override the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check the credential and endpoint
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(ProfilesError::Config(
                "search API key is not set (pass --api-key or set SERPAPI_API_KEY)".to_string(),
            ));
        }
        url::Url::parse(&self.endpoint).map_err(|e| {
            ProfilesError::Config(format!("Invalid search endpoint '{}': {}", self.endpoint, e))
        })?;
        Ok(())
    }
}

/// HTTP query surface configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Fixed listing page size
    pub page_size: i64,
    /// Bearer token required for persisting imports; `None` disables them
    pub admin_token: Option<String>,
    /// Label written into the AffiliationOrgLabel export column
    pub org_label: String,
    /// Pause between candidates for imports triggered over HTTP
    pub import_delay: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            admin_token: None,
            org_label: DEFAULT_AFFILIATION_HINT.to_string(),
            import_delay: Duration::from_secs(1),
        }
    }
}

/// Default database path: `<data dir>/rustprofiles/profiles.db`
pub fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("rustprofiles").join("profiles.db"))
        .unwrap_or_else(|| PathBuf::from("profiles.db"))
}
