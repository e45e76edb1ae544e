use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::MarketConfig;
use crate::constants;
use crate::error::FeedError;
use crate::events::{MarketSnapshot, PriceChange};
use crate::feed::traits::{FeedResult, MarketDataSource};

/// DexScreener token endpoint (`/tokens/v1/{chain}/{address}`)
#[derive(Clone)]
pub struct DexScreenerClient {
    client: Client,
    base_url: String,
    chain: String,
}

impl DexScreenerClient {
    pub fn new(config: &MarketConfig) -> Self {
        let client = Client::builder()
            .timeout(constants::feed::HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chain: config.chain.clone(),
        }
    }

    fn url(&self, address: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.chain, address)
    }
}

#[async_trait]
impl MarketDataSource for DexScreenerClient {
    async fn latest(&self, asset: &str) -> FeedResult<MarketSnapshot> {
        let url = self.url(asset);
        debug!("📈 Fetching market data: {}", url);

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FeedError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let data: Value = resp.json().await?;
        parse_token_pairs(&data, asset).ok_or_else(|| FeedError::Unavailable {
            reason: format!("no market pairs for {}", asset),
        })
    }
}

fn number(v: Option<&Value>) -> f64 {
    match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Takes the first pair of a DexScreener token response
pub fn parse_token_pairs(data: &Value, address: &str) -> Option<MarketSnapshot> {
    let pair = data.as_array()?.first()?;
    let symbol = pair
        .get("baseToken")
        .and_then(|t| t.get("symbol"))
        .and_then(|s| s.as_str())
        .unwrap_or("UNKNOWN")
        .to_string();
    let change = pair.get("priceChange");

    Some(MarketSnapshot {
        symbol,
        address: address.to_string(),
        price: number(pair.get("priceUsd")),
        market_cap: number(pair.get("marketCap")),
        change: PriceChange {
            m5: number(change.and_then(|c| c.get("m5"))),
            h1: number(change.and_then(|c| c.get("h1"))),
            h24: number(change.and_then(|c| c.get("h24"))),
        },
        volume_24h: number(pair.get("volume").and_then(|v| v.get("h24"))),
        liquidity: number(pair.get("liquidity").and_then(|l| l.get("usd"))),
        fetched_at: Utc::now(),
    })
}
