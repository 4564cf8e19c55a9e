//! Exchange REST client.
//!
//! The trading core consumes the [`ExchangeClient`] trait; the HTTP
//! implementation signs each request with the exchange's header scheme and
//! carries a per-request timeout. Signature production itself is pluggable —
//! the bot only defines the seam.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::types::{
    ApiBalance, ApiMarket, ApiOrder, ApiPosition, ApiSides, CancelAllResponse, CreateOrderRequest,
};
use super::ApiError;
use crate::data::orderbook::BookFrame;

/// Produces the signature over `timestamp || method || path` for the
/// authentication headers. Implementations hold the private key material.
pub trait Signer: Send + Sync {
    fn key_id(&self) -> &str;
    fn sign(&self, message: &str) -> String;
}

/// Authentication headers for one request: key id, millisecond timestamp,
/// and the signature over `timestamp + METHOD + path`.
pub fn auth_headers(signer: &dyn Signer, method: &str, path: &str) -> Vec<(&'static str, String)> {
    let timestamp = Utc::now().timestamp_millis().to_string();
    auth_headers_at(signer, method, path, &timestamp)
}

pub fn auth_headers_at(
    signer: &dyn Signer,
    method: &str,
    path: &str,
    timestamp: &str,
) -> Vec<(&'static str, String)> {
    let message = format!("{timestamp}{}{path}", method.to_uppercase());
    vec![
        ("X-PM-Access-Key", signer.key_id().to_string()),
        ("X-PM-Timestamp", timestamp.to_string()),
        ("X-PM-Signature", signer.sign(&message)),
    ]
}

/// Signer backed by a pre-provisioned signing token, for deployments where
/// a gateway or sidecar holds the key material and derives real signatures
/// from the token. Direct key-based signing implements [`Signer`] outside
/// this crate.
pub struct StaticTokenSigner {
    key_id: String,
    token: String,
}

impl StaticTokenSigner {
    pub fn new(key_id: String, token: String) -> Self {
        Self { key_id, token }
    }
}

impl Signer for StaticTokenSigner {
    fn key_id(&self) -> &str {
        &self.key_id
    }
    fn sign(&self, _message: &str) -> String {
        self.token.clone()
    }
}

/// Minimum REST surface the executors and feeds consume.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn get_markets(&self) -> Result<Vec<ApiMarket>, ApiError>;

    /// Full depth snapshot for one market.
    async fn get_market_sides(&self, market_slug: &str) -> Result<BookFrame, ApiError>;

    async fn place_order(&self, request: &CreateOrderRequest) -> Result<ApiOrder, ApiError>;

    async fn cancel_order(&self, order_id: &str) -> Result<bool, ApiError>;

    async fn cancel_all_orders(&self, market_slug: Option<&str>) -> Result<usize, ApiError>;

    async fn get_open_orders(&self) -> Result<Vec<ApiOrder>, ApiError>;

    async fn get_order(&self, order_id: &str) -> Result<Option<ApiOrder>, ApiError>;

    async fn get_positions(&self) -> Result<Vec<ApiPosition>, ApiError>;

    async fn get_balances(&self) -> Result<ApiBalance, ApiError>;
}

/// Public market-data endpoints work unsigned; the private trading surface
/// requires a signer.
pub struct HttpExchangeClient {
    http: reqwest::Client,
    base_url: String,
    signer: Option<Arc<dyn Signer>>,
}

impl HttpExchangeClient {
    pub fn new(
        base_url: &str,
        signer: Option<Arc<dyn Signer>>,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        if let Some(signer) = &signer {
            if signer.key_id().is_empty() {
                return Err(ApiError::Credentials("api key id is empty"));
            }
        }
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            signer,
        })
    }

    fn public(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method.clone(), format!("{}{}", self.base_url, path));
        if let Some(signer) = &self.signer {
            for (name, value) in auth_headers(signer.as_ref(), method.as_str(), path) {
                builder = builder.header(name, value);
            }
        }
        builder
    }

    fn signed(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder, ApiError> {
        if self.signer.is_none() {
            return Err(ApiError::Credentials("endpoint requires a signer"));
        }
        Ok(self.public(method, path))
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ExchangeClient for HttpExchangeClient {
    async fn get_markets(&self) -> Result<Vec<ApiMarket>, ApiError> {
        let response = self.public(reqwest::Method::GET, "/v1/markets").send().await?;
        Self::decode(response).await
    }

    async fn get_market_sides(&self, market_slug: &str) -> Result<BookFrame, ApiError> {
        let path = format!("/v1/market/{market_slug}/sides");
        let response = self.public(reqwest::Method::GET, &path).send().await?;
        let sides: ApiSides = Self::decode(response).await?;
        Ok(sides.to_frame(Utc::now()))
    }

    async fn place_order(&self, request: &CreateOrderRequest) -> Result<ApiOrder, ApiError> {
        let response = self
            .signed(reqwest::Method::POST, "/v1/orders")?
            .json(request)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool, ApiError> {
        let path = format!("/v1/orders/{order_id}");
        let response = self.signed(reqwest::Method::DELETE, &path)?.send().await?;
        match response.status().as_u16() {
            200 | 204 => Ok(true),
            404 => Ok(false),
            status => Err(ApiError::Status {
                status,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn cancel_all_orders(&self, market_slug: Option<&str>) -> Result<usize, ApiError> {
        let path = match market_slug {
            Some(slug) => format!("/v1/orders?marketSlug={slug}"),
            None => "/v1/orders".to_string(),
        };
        let response = self.signed(reqwest::Method::DELETE, &path)?.send().await?;
        let decoded: CancelAllResponse = Self::decode(response).await?;
        Ok(decoded.cancelled)
    }

    async fn get_open_orders(&self) -> Result<Vec<ApiOrder>, ApiError> {
        let response = self.signed(reqwest::Method::GET, "/v1/orders")?.send().await?;
        Self::decode(response).await
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<ApiOrder>, ApiError> {
        let path = format!("/v1/orders/{order_id}");
        let response = self.signed(reqwest::Method::GET, &path)?.send().await?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        Ok(Some(Self::decode(response).await?))
    }

    async fn get_positions(&self) -> Result<Vec<ApiPosition>, ApiError> {
        let response = self.signed(reqwest::Method::GET, "/v1/positions")?.send().await?;
        Self::decode(response).await
    }

    async fn get_balances(&self) -> Result<ApiBalance, ApiError> {
        let response = self.signed(reqwest::Method::GET, "/v1/balances")?.send().await?;
        Self::decode(response).await
    }
}
