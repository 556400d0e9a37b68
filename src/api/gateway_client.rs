//! HTTP client for the signal gateway: scored signals and quotes.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::models::{Direction, Quote, Signal};

use super::types::{QuoteResponse, SignalResponse};
use super::{PriceFeed, SignalSource};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(20);

/// Client for the signal gateway (read-only).
pub struct GatewayClient {
    client: Client,
    base_url: String,
}

impl GatewayClient {
    /// Create a client for the gateway at `base_url`.
    pub fn with_base_url(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn retry_policy() -> ExponentialBackoff {
        ExponentialBackoff {
            max_elapsed_time: Some(MAX_RETRY_ELAPSED),
            ..Default::default()
        }
    }

    /// GET `url`, retrying transport errors and 5xx responses.
    ///
    /// Returns `None` on 404.
    async fn get_json<T: serde::de::DeserializeOwned + Send>(&self, url: &str) -> Result<Option<T>> {
        backoff::future::retry(Self::retry_policy(), move || async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .context("Gateway request failed")
                .map_err(backoff::Error::transient)?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let err = anyhow::anyhow!("Gateway request failed: {} - {}", status, body);
                return Err(if status.is_server_error() {
                    warn!(url = %url, status = %status, "Gateway error, retrying");
                    backoff::Error::transient(err)
                } else {
                    backoff::Error::permanent(err)
                });
            }

            response
                .json::<T>()
                .await
                .context("Failed to parse gateway response")
                .map(Some)
                .map_err(backoff::Error::permanent)
        })
        .await
    }
}

fn convert_signal(raw: SignalResponse) -> Option<Signal> {
    let direction = match raw.direction.parse::<Direction>() {
        Ok(d) => d,
        Err(_) => {
            warn!(symbol = %raw.symbol, direction = %raw.direction, "Unknown signal direction");
            return None;
        }
    };

    let timestamp = if raw.timestamp > 0 {
        Utc.timestamp_opt(raw.timestamp, 0).single()?
    } else {
        Utc::now()
    };

    Some(Signal {
        symbol: raw.symbol,
        raw_direction: direction,
        strength_score: raw.strength.clamp(0.0, 10.0),
        volume_score: raw.volume_score.clamp(0.0, 10.0),
        atr: raw.atr,
        price: raw.price,
        timestamp,
        timeframe_confluence: raw.confluence.join("+"),
    })
}

#[async_trait]
impl SignalSource for GatewayClient {
    async fn fetch_signals(&self, symbols: &[String], timeframes: &[String]) -> Result<Vec<Signal>> {
        let url = format!(
            "{}/signals?symbols={}&timeframes={}",
            self.base_url,
            symbols.join(","),
            timeframes.join(",")
        );

        debug!(url = %url, "Fetching signals");

        let items: Vec<SignalResponse> = self.get_json(&url).await?.unwrap_or_default();
        Ok(items.into_iter().filter_map(convert_signal).collect())
    }
}

#[async_trait]
impl PriceFeed for GatewayClient {
    async fn quote(&self, symbol: &str) -> Result<Option<Quote>> {
        let url = format!("{}/quote/{}", self.base_url, symbol);

        debug!(url = %url, "Fetching quote");

        let Some(raw) = self.get_json::<QuoteResponse>(&url).await? else {
            return Ok(None);
        };
        let Some(price) = raw.price() else {
            return Ok(None);
        };

        let timestamp = Utc
            .timestamp_opt(raw.timestamp, 0)
            .single()
            .filter(|_| raw.timestamp > 0)
            .unwrap_or_else(Utc::now);

        Ok(Some(Quote {
            price,
            atr: raw.atr,
            timestamp,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn raw(direction: &str) -> SignalResponse {
        SignalResponse {
            symbol: "USDJPYm".to_string(),
            direction: direction.to_string(),
            strength: 11.0,
            volume_score: 7.0,
            atr: dec!(0.21),
            price: dec!(150.12),
            timestamp: 1709546400,
            confluence: vec!["M5".to_string(), "H1".to_string()],
        }
    }

    #[test]
    fn test_convert_signal() {
        let signal = convert_signal(raw("buy")).unwrap();
        assert_eq!(signal.raw_direction, Direction::Buy);
        assert_eq!(signal.strength_score, 10.0);
        assert_eq!(signal.timeframe_confluence, "M5+H1");
    }

    #[test]
    fn test_unknown_direction_dropped() {
        assert!(convert_signal(raw("HOLD")).is_none());
    }

    #[test]
    fn test_base_url_trimmed() {
        let client = GatewayClient::with_base_url("http://localhost:9000/".to_string()).unwrap();
        assert_eq!(client.base_url(), "http://localhost:9000");
    }
}
