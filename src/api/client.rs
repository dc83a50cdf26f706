use super::messages::{
    CreateSessionRequest, ExtendSessionRequest, Extension, Pricing, PricingResponse,
    SessionDescriptor,
};
use crate::error::{Result, SttError};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Wait bound for the unauthenticated lookups
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Buys and extends streaming sessions.
///
/// The stream only consumes the resulting descriptors; how the purchase is
/// paid for is up to the implementation.
#[async_trait::async_trait]
pub trait SessionNegotiator: Send + Sync {
    async fn create_session(&self, minutes: u32, language: &str) -> Result<SessionDescriptor>;

    async fn extend_session(&self, session_id: &str, minutes: u32) -> Result<Extension>;
}

/// Attaches payment authorization to a paid request.
#[async_trait::async_trait]
pub trait PaymentAuthorizer: Send + Sync {
    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder>;
}

/// Sends paid requests unmodified.
#[derive(Debug, Default, Clone)]
pub struct NoPayment;

#[async_trait::async_trait]
impl PaymentAuthorizer for NoPayment {
    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        Ok(request)
    }
}

/// Adds one fixed header (e.g. a pre-signed payment token) to paid requests.
#[derive(Debug, Clone)]
pub struct StaticHeader {
    name: String,
    value: String,
}

impl StaticHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[async_trait::async_trait]
impl PaymentAuthorizer for StaticHeader {
    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        Ok(request.header(self.name.as_str(), self.value.as_str()))
    }
}

/// HTTP client for the session service.
#[derive(Clone)]
pub struct HttpSessionApi {
    base_url: String,
    client: reqwest::Client,
    authorizer: Arc<dyn PaymentAuthorizer>,
}

impl HttpSessionApi {
    pub fn new(base_url: impl Into<String>, authorizer: Arc<dyn PaymentAuthorizer>) -> Self {
        Self::with_client(base_url, reqwest::Client::new(), authorizer)
    }

    /// Use a preconfigured HTTP client (proxies, TLS roots, ...).
    pub fn with_client(
        base_url: impl Into<String>,
        client: reqwest::Client,
        authorizer: Arc<dyn PaymentAuthorizer>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            authorizer,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET /pricing
    pub async fn pricing(&self) -> Result<Pricing> {
        let response = self
            .client
            .get(format!("{}/pricing", self.base_url))
            .timeout(LOOKUP_TIMEOUT)
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(SttError::server(format!(
                "pricing lookup failed ({status}): {}",
                body_text(response).await
            )));
        }

        let raw: PricingResponse = response.json().await?;
        Ok(raw.into())
    }

    /// GET /health
    pub async fn health(&self) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(LOOKUP_TIMEOUT)
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(SttError::server(format!(
                "health check failed ({status}): {}",
                body_text(response).await
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl SessionNegotiator for HttpSessionApi {
    async fn create_session(&self, minutes: u32, language: &str) -> Result<SessionDescriptor> {
        info!("Purchasing {} minute session (language={})", minutes, language);

        let request = self
            .client
            .post(format!("{}/v1/session", self.base_url))
            .json(&CreateSessionRequest {
                minutes,
                language: language.to_string(),
            });
        let response = self
            .authorizer
            .authorize(request)
            .await?
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if status == StatusCode::PAYMENT_REQUIRED {
            return Err(SttError::payment(body_text(response).await));
        }
        if !status.is_success() {
            return Err(SttError::server(format!(
                "session creation failed ({status}): {}",
                body_text(response).await
            )));
        }

        let descriptor: SessionDescriptor = response.json().await?;
        info!(
            "Session {} created: {}s remaining, ${:.4}",
            descriptor.session_id, descriptor.remaining_seconds, descriptor.price_usd
        );
        Ok(descriptor)
    }

    async fn extend_session(&self, session_id: &str, minutes: u32) -> Result<Extension> {
        info!("Extending session {} by {} minutes", session_id, minutes);

        let request = self
            .client
            .post(format!("{}/v1/session/extend", self.base_url))
            .json(&ExtendSessionRequest {
                session_id: session_id.to_string(),
                minutes,
            });
        let response = self
            .authorizer
            .authorize(request)
            .await?
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SttError::payment(format!(
                "session extension failed ({status}): {}",
                body_text(response).await
            )));
        }

        Ok(response.json().await?)
    }
}

/// Stream endpoint for a session: the descriptor's own URL when given,
/// otherwise `/v1/stream` on the HTTP base with the scheme switched to ws(s).
pub fn stream_endpoint(base_url: &str, descriptor: &SessionDescriptor) -> String {
    if let Some(url) = &descriptor.ws_url {
        return url.clone();
    }

    let base = base_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };

    format!("{base}/v1/stream")
}

fn request_error(error: reqwest::Error) -> SttError {
    if error.is_connect() || error.is_timeout() {
        SttError::connection(error.to_string())
    } else {
        SttError::Http(error)
    }
}

async fn body_text(response: Response) -> String {
    match response.text().await {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to read error response body: {}", e);
            String::new()
        }
    }
}
