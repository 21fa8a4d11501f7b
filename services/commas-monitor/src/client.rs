//! 3Commas API Client

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{Credentials, BASE_URL};
use crate::error::{ClientError, Result};
use crate::signer::{signature_path, QueryParams, Signer};

/// Per-request timeout
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

pub const BOT_STATS_ENDPOINT: &str = "/ver1/bots/stats";
pub const ACCOUNTS_ENDPOINT: &str = "/ver1/accounts";
pub const BOTS_ENDPOINT: &str = "/ver1/bots";

/// Operations the poll coordinator needs from the API
#[async_trait::async_trait]
pub trait ThreeCommasApi: Send + Sync {
    /// DCA bot statistics, optionally filtered
    async fn get_bot_stats(&self, account_id: Option<&str>, bot_id: Option<&str>) -> Result<Value>;

    /// Connected exchanges and wallets
    async fn get_accounts(&self) -> Result<Value>;

    /// DCA bots, optionally filtered; `scope` defaults to `enabled`
    async fn get_bots(
        &self,
        account_id: Option<&str>,
        strategy: Option<&str>,
        scope: Option<&str>,
    ) -> Result<Value>;
}

/// Signed HTTPS client for the public 3Commas API
pub struct ThreeCommasClient {
    client: Client,
    base_url: String,
    signer: Signer,
}

impl ThreeCommasClient {
    /// Create a client against the public API host
    pub fn new(credentials: &Credentials) -> Result<Self> {
        Self::with_base_url(
            credentials,
            BASE_URL,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        )
    }

    /// Create a client against `base_url` with a custom per-request timeout
    pub fn with_base_url(credentials: &Credentials, base_url: &str, timeout: Duration) -> Result<Self> {
        let signer = Signer::new(credentials)?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Unexpected(Box::new(e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            signer,
        })
    }

    /// Single account by id
    pub async fn get_account(&self, account_id: &str) -> Result<Value> {
        let endpoint = format!("{}/{}", ACCOUNTS_ENDPOINT, account_id);
        self.request(Method::GET, &endpoint, &QueryParams::new(), None).await
    }

    /// Issue one signed request. No retries.
    ///
    /// Returns `{}` for 204 responses.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &QueryParams,
        body: Option<&Value>,
    ) -> Result<Value> {
        let path = signature_path(endpoint, params);
        let headers = self.signer.sign(method.as_str(), endpoint, params)?;
        let url = format!("{}{}", self.base_url, path);

        debug!("{} {}", method, url);

        let mut request = self.client.request(method, &url);
        for (name, value) in headers.pairs() {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!("Got response with status: {}", status);

        verify_status(status)?;
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Object(Default::default()));
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            warn!("Undecodable response from {}: {}", endpoint, e);
            ClientError::Unexpected(Box::new(e))
        })
    }
}

/// Map a status to the error taxonomy: 401/403 auth, 204 ok, other non-2xx communication
pub fn verify_status(status: StatusCode) -> Result<()> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ClientError::Authentication("Invalid credentials".to_string()));
    }
    if status == StatusCode::NO_CONTENT || status.is_success() {
        return Ok(());
    }
    Err(ClientError::Communication(format!(
        "Error fetching information - HTTP {}",
        status
    )))
}

#[async_trait::async_trait]
impl ThreeCommasApi for ThreeCommasClient {
    async fn get_bot_stats(&self, account_id: Option<&str>, bot_id: Option<&str>) -> Result<Value> {
        let mut params = QueryParams::new();
        if let Some(account_id) = account_id {
            params.insert("account_id".into(), account_id.to_string());
        }
        if let Some(bot_id) = bot_id {
            params.insert("bot_id".into(), bot_id.to_string());
        }
        self.request(Method::GET, BOT_STATS_ENDPOINT, &params, None).await
    }

    async fn get_accounts(&self) -> Result<Value> {
        self.request(Method::GET, ACCOUNTS_ENDPOINT, &QueryParams::new(), None)
            .await
    }

    async fn get_bots(
        &self,
        account_id: Option<&str>,
        strategy: Option<&str>,
        scope: Option<&str>,
    ) -> Result<Value> {
        let mut params = QueryParams::new();
        if let Some(account_id) = account_id {
            params.insert("account_id".into(), account_id.to_string());
        }
        if let Some(strategy) = strategy {
            params.insert("strategy".into(), strategy.to_string());
        }
        params.insert("scope".into(), scope.unwrap_or("enabled").to_string());
        self.request(Method::GET, BOTS_ENDPOINT, &params, None).await
    }
}
