use serde::{Deserialize, Serialize};

/// A purchased block of streaming time, as returned by `POST /v1/session`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub session_id: String,
    /// Token presented in the stream config frame
    pub session_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    pub remaining_seconds: u64,
    pub minutes: u32,
    pub price_usd: f64,
}

/// Body of `POST /v1/session`
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub minutes: u32,
    pub language: String,
}

/// Body of `POST /v1/session/extend`
#[derive(Debug, Serialize, Deserialize)]
pub struct ExtendSessionRequest {
    pub session_id: String,
    pub minutes: u32,
}

/// Result of a successful extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extension {
    pub remaining_seconds: u64,
    pub minutes_added: u32,
    pub price_usd: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PricingResponse {
    pub price_per_minute_usd: f64,
    pub min_minutes: u32,
    pub max_minutes: u32,
    #[serde(default)]
    pub min_price_usd: Option<f64>,
    pub currency: String,
    pub network: String,
}

/// Published pricing from `GET /pricing`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pricing {
    pub price_per_minute_usd: f64,
    pub min_minutes: u32,
    pub max_minutes: u32,
    pub min_price_usd: f64,
    pub currency: String,
    pub network: String,
}

impl From<PricingResponse> for Pricing {
    fn from(raw: PricingResponse) -> Self {
        let min_price_usd = raw
            .min_price_usd
            .unwrap_or(raw.price_per_minute_usd * raw.min_minutes as f64);

        Self {
            price_per_minute_usd: raw.price_per_minute_usd,
            min_minutes: raw.min_minutes,
            max_minutes: raw.max_minutes,
            min_price_usd,
            currency: raw.currency,
            network: raw.network,
        }
    }
}
