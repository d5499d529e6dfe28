use anyhow::{Context, Result};
use gapfade_core::BrokerConfig;
use governor::{clock::DefaultClock, state::InMemoryState, Quota, RateLimiter};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Alpaca allows 200 requests per minute per account.
const REQUESTS_PER_MINUTE: u32 = 200;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Authenticated HTTP client for the Alpaca trading and market-data APIs.
pub struct AlpacaClient {
    http_client: Client,
    trading_url: String,
    data_url: String,
    feed: String,
    rate_limiter: Arc<RateLimiter<governor::state::direct::NotKeyed, InMemoryState, DefaultClock>>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

impl AlpacaClient {
    /// # Errors
    /// Fails if credentials are missing or not valid header values.
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        let key = config.api_key.as_deref().context("Alpaca API key missing")?;
        let secret = config
            .api_secret
            .as_deref()
            .context("Alpaca API secret missing")?;

        let mut headers = HeaderMap::new();
        let mut key_value = HeaderValue::from_str(key).context("invalid API key")?;
        key_value.set_sensitive(true);
        let mut secret_value = HeaderValue::from_str(secret).context("invalid API secret")?;
        secret_value.set_sensitive(true);
        headers.insert("APCA-API-KEY-ID", key_value);
        headers.insert("APCA-API-SECRET-KEY", secret_value);

        let http_client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        let quota = Quota::per_minute(
            NonZeroU32::new(REQUESTS_PER_MINUTE).context("rate limit must be non-zero")?,
        );

        Ok(Self {
            http_client,
            trading_url: config.trading_url.trim_end_matches('/').to_string(),
            data_url: config.data_url.trim_end_matches('/').to_string(),
            feed: config.feed.clone(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    #[must_use]
    pub fn feed(&self) -> &str {
        &self.feed
    }

    pub async fn get_data<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.data_url, endpoint);
        let request = self.http_client.get(&url).query(query);
        self.send(request, endpoint).await
    }

    pub async fn get_trading<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.trading_url, endpoint);
        self.send(self.http_client.get(&url).query(query), endpoint)
            .await
    }

    pub async fn post_trading<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.trading_url, endpoint);
        self.send(self.http_client.post(&url).json(body), endpoint)
            .await
    }

    pub async fn delete_trading<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.trading_url, endpoint);
        let request = self.http_client.request(Method::DELETE, &url).query(query);
        self.send(request, endpoint).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, endpoint: &str) -> Result<T> {
        self.rate_limiter.until_ready().await;
        let response = request
            .send()
            .await
            .with_context(|| format!("request to {endpoint} failed"))?;
        let response = check_status(response, endpoint).await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("unexpected response body from {endpoint}"))
    }
}

async fn check_status(response: Response, endpoint: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiError>(&body)
        .map(|e| e.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or(body);
    anyhow::bail!("Alpaca {endpoint} returned {status}: {message}")
}
