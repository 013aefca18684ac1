//! Fetches the public keys an account publishes on its code-hosting service.
//!
//! One GET per call, no retries, no caching: the gateway resolves once at
//! startup and refuses to serve without a key set.

use crate::auth::pubkey::AuthorizedKeySet;
use crate::config::types::AccessConfig;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("building HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("fetching {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("fetching {url}: HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("reading response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

pub struct KeyResolver {
    client: reqwest::Client,
    access: AccessConfig,
}

impl KeyResolver {
    /// Resolver for a bare URL template containing `{user}`.
    pub fn new(url_template: impl Into<String>) -> Result<Self, ResolveError> {
        Self::from_config(&AccessConfig {
            keys_url: url_template.into(),
            ..AccessConfig::default()
        })
    }

    pub fn from_config(access: &AccessConfig) -> Result<Self, ResolveError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("keygate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ResolveError::Client)?;
        Ok(Self {
            client,
            access: access.clone(),
        })
    }

    /// Retrieve and parse the account's key listing.
    pub async fn resolve(&self, account: &str) -> Result<AuthorizedKeySet, ResolveError> {
        let url = self.access.keys_url_for(account);
        info!(user = %account, url = %url, "Fetching published SSH keys");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| ResolveError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Status { url, status });
        }

        let body = response
            .text()
            .await
            .map_err(|source| ResolveError::Body {
                url: url.clone(),
                source,
            })?;
        debug!(bytes = body.len(), "Key listing received");

        let keys = AuthorizedKeySet::parse_listing(&body);
        info!(
            user = %account,
            parsed = keys.parsed_count(),
            unparsable = keys.unparsable_count(),
            "Published SSH keys resolved"
        );
        Ok(keys)
    }
}
