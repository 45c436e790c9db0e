//! Scholar search API client.
//!
//! One HTTP GET per call against the configured endpoint, with the API key
//! in the query string. No retries: a failed call surfaces as a transport
//! error and the caller decides whether to skip the unit of work.

use crate::config::SearchConfig;
use crate::error::{ProfilesError, Result};
use crate::normalize::{self, AuthorCandidate, PublicationCandidate};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::{form_urlencoded, Url};

/// Engine for general scholar search
pub const ENGINE_SCHOLAR: &str = "google_scholar";

/// Engine for a single author profile
pub const ENGINE_SCHOLAR_AUTHOR: &str = "google_scholar_author";

/// How a profile reference resolves to request parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileLookup {
    /// Author id extracted from the link or given directly
    AuthorId(String),
    /// Anything else: search for the reference itself
    Query(String),
}

impl ProfileLookup {
    /// Resolve a stored profile reference.
    ///
    /// URLs carrying `user=` or `author=` map to the author engine; bare
    /// identifiers are taken as the author id; other URLs become a query.
    pub fn resolve(profile_ref: &str) -> Self {
        let profile_ref = profile_ref.trim();
        let author_id = match Url::parse(profile_ref) {
            Ok(url) => author_param(url.query_pairs()),
            // Scheme-less links still carry the id in their query string
            Err(_) => profile_ref
                .split_once('?')
                .and_then(|(_, query)| author_param(form_urlencoded::parse(query.as_bytes()))),
        };
        if let Some(id) = author_id {
            return Self::AuthorId(id);
        }

        let is_bare_id = !profile_ref.is_empty()
            && !profile_ref.contains(char::is_whitespace)
            && !profile_ref.contains(|c: char| c == '?' || c == '/')
            && Url::parse(profile_ref).is_err();
        if is_bare_id {
            Self::AuthorId(profile_ref.to_string())
        } else {
            Self::Query(profile_ref.to_string())
        }
    }
}

/// Value of the first non-empty `user` or `author` query parameter
fn author_param(pairs: form_urlencoded::Parse<'_>) -> Option<String> {
    pairs
        .into_iter()
        .find(|(k, v)| (k == "user" || k == "author") && !v.is_empty())
        .map(|(_, v)| v.into_owned())
}

/// Search API client. The underlying connection pool is reused across calls.
#[derive(Debug, Clone)]
pub struct SerpApiClient {
    client: reqwest::Client,
    config: SearchConfig,
}

impl SerpApiClient {
    /// Create a client from a validated config
    pub fn new(config: SearchConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("rustprofiles/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProfilesError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Raw general scholar search
    #[instrument(skip(self))]
    pub async fn search_scholar(&self, query: &str, num: usize) -> Result<Value> {
        let num = num.to_string();
        self.get(&[("engine", ENGINE_SCHOLAR), ("q", query), ("num", num.as_str())])
            .await
    }

    /// Search for author candidates matching `query`
    pub async fn search_authors(&self, query: &str, limit: usize) -> Result<Vec<AuthorCandidate>> {
        let doc = self.search_scholar(query, limit).await?;
        let authors = normalize::extract_authors(&doc);
        info!(query, count = authors.len(), "Author search complete");
        Ok(authors)
    }

    /// Fetch the raw document behind a profile reference
    #[instrument(skip(self))]
    pub async fn fetch_author_profile(&self, profile_ref: &str) -> Result<Value> {
        match ProfileLookup::resolve(profile_ref) {
            ProfileLookup::AuthorId(id) => {
                self.get(&[("engine", ENGINE_SCHOLAR_AUTHOR), ("author_id", id.as_str())])
                    .await
            }
            ProfileLookup::Query(q) => self.get(&[("engine", ENGINE_SCHOLAR), ("q", q.as_str())]).await,
        }
    }

    /// Publications for an author: via the profile when one is known, falling
    /// back to a name + institution query. The fallback's failure propagates.
    pub async fn search_publications(
        &self,
        author: &str,
        profile_ref: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PublicationCandidate>> {
        if let Some(profile_ref) = profile_ref.filter(|r| !r.trim().is_empty()) {
            match self.fetch_author_profile(profile_ref).await {
                Ok(doc) => {
                    let mut pubs = normalize::extract_publications(&doc);
                    pubs.truncate(limit);
                    return Ok(pubs);
                }
                Err(e) => {
                    warn!(author, error = %e, "Profile lookup failed, falling back to query");
                }
            }
        }

        let query = format!("{} {}", author, self.config.affiliation_hint);
        let doc = self.search_scholar(&query, limit).await?;
        let mut pubs = normalize::extract_publications(&doc);
        pubs.truncate(limit);
        Ok(pubs)
    }

    async fn get(&self, params: &[(&str, &str)]) -> Result<Value> {
        debug!(endpoint = %self.config.endpoint, ?params, "Search request");

        let response = self
            .client
            .get(&self.config.endpoint)
            .query(params)
            .query(&[("api_key", self.config.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProfilesError::RateLimited(60));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProfilesError::Api {
                code: status.as_u16() as i32,
                message: format!("HTTP error: {} {}", status, error_message(&body)),
            });
        }

        let body = response.text().await?;
        let doc: Value = serde_json::from_str(&body)
            .map_err(|e| ProfilesError::MalformedResponse(format!("body is not JSON: {}", e)))?;
        if !doc.is_object() {
            return Err(ProfilesError::MalformedResponse(
                "expected a JSON object at the top level".to_string(),
            ));
        }
        if let Some(message) = doc.get("error").and_then(Value::as_str) {
            return Err(ProfilesError::Api {
                code: status.as_u16() as i32,
                message: message.to_string(),
            });
        }

        Ok(doc)
    }
}

/// Pull `error` out of a JSON error body, else a truncated body
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}
