//! Authenticated HTTP client for the UpCloud API

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Url;
use std::fmt;
use std::time::Duration;
use types::{BuilderError, Result};

/// Base URL of the UpCloud API
pub const DEFAULT_API_URL: &str = "https://api.upcloud.com/1.3/";

/// Tunables for [`Client`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// API base URL, must end with `/`
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(60),
            user_agent: format!("upcloud-builder/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// HTTP client carrying UpCloud API credentials
#[derive(Clone)]
pub struct Client {
    username: String,
    password: String,
    base_url: Url,
    timeout: Duration,
    http_client: reqwest::Client,
}

impl Client {
    /// Create a new client for the public API
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        Self::with_options(username, password, ClientOptions::default())
    }

    /// Create a new client with custom options
    pub fn with_options(
        username: impl Into<String>,
        password: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self> {
        let base_url = Url::parse(&options.base_url)
            .map_err(|e| BuilderError::Client(format!("invalid base URL {:?}: {}", options.base_url, e)))?;

        if !base_url.path().ends_with('/') {
            return Err(BuilderError::Client(format!(
                "base URL must end with '/': {}",
                base_url
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent)
            .default_headers(headers)
            .build()
            .map_err(|e| BuilderError::Client(format!("failed to create HTTP client: {}", e)))?;

        let username = username.into();
        tracing::debug!(
            username = %types::utils::sanitize_for_logging(&username),
            base_url = %base_url,
            "Created API client"
        );

        Ok(Self {
            username,
            password: password.into(),
            base_url,
            timeout: options.timeout,
            http_client,
        })
    }

    /// API username
    pub fn username(&self) -> &str {
        &self.username
    }

    /// API base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http_client
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish()
    }
}
