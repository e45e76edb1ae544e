use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::config::FeedConfig;
use crate::constants;
use crate::error::FeedError;
use crate::events::{ChatEvent, Event, TradeEvent, TradeKind};

use super::traits::{FeedResult, PolledItem, PullSource};

fn http_client() -> Client {
    Client::builder()
        .timeout(constants::feed::HTTP_TIMEOUT)
        .user_agent("Mozilla/5.0 (compatible; live-commentary/0.1)")
        .build()
        .unwrap_or_else(|_| Client::new())
}

async fn get_json(client: &Client, url: Url) -> FeedResult<Value> {
    let resp = client.get(url).header("Accept", "application/json").send().await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(FeedError::Http {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp.json().await?)
}

/// Accepts epoch seconds, epoch millis or RFC 3339 strings
fn parse_time(v: Option<&Value>) -> Option<DateTime<Utc>> {
    match v? {
        Value::Number(n) => {
            let raw = n.as_i64()?;
            // anything past year 2286 in seconds is really millis
            if raw > 10_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc)),
        _ => None,
    }
}

fn short(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Parses a pump.fun replies page. Malformed entries are skipped.
pub fn parse_replies(data: &Value, max_chars: usize) -> Vec<PolledItem> {
    let Some(arr) = data.as_array() else {
        return Vec::new();
    };

    arr.iter()
        .filter_map(|msg| {
            let text = msg.get("text").and_then(|t| t.as_str())?;
            let user = msg.get("user");
            let author = msg
                .get("username")
                .and_then(|u| u.as_str())
                .or_else(|| user.and_then(|u| u.get("username")).and_then(|u| u.as_str()))
                .map(str::to_string)
                .or_else(|| {
                    let wallet = user
                        .and_then(|u| u.as_str().or_else(|| u.get("wallet").and_then(|w| w.as_str())))?;
                    Some(short(wallet, 8))
                })
                .unwrap_or_else(|| "anon".to_string());
            let at = parse_time(msg.get("created_at"))
                .or_else(|| parse_time(msg.get("timestamp")))
                .unwrap_or_else(Utc::now);
            let id = match msg.get("id") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            };

            let chat = ChatEvent::new(author, text, at, max_chars)?;
            Some(PolledItem {
                id,
                event: Event::Chat(chat),
            })
        })
        .collect()
}

/// Parses a pump.fun trades page (`sol_amount` in lamports)
pub fn parse_trades(data: &Value) -> Vec<PolledItem> {
    let Some(arr) = data.as_array() else {
        return Vec::new();
    };

    arr.iter()
        .filter_map(|t| {
            let kind = match t.get("is_buy").and_then(|b| b.as_bool()) {
                Some(true) => TradeKind::Buy,
                Some(false) => TradeKind::Sell,
                None => TradeKind::parse(t.get("type").and_then(|x| x.as_str())?)?,
            };
            let lamports = t.get("sol_amount").and_then(|a| a.as_f64())?;
            let actor = t.get("user").and_then(|u| u.as_str()).unwrap_or("anon");
            let at = parse_time(t.get("timestamp")).unwrap_or_else(Utc::now);
            let trade = TradeEvent::new(kind, lamports / constants::feed::LAMPORTS_PER_SOL, actor, at)?;
            Some(PolledItem {
                id: t.get("signature").and_then(|s| s.as_str()).map(str::to_string),
                event: Event::Trade(trade),
            })
        })
        .collect()
}

/// Chat replies for a token
#[derive(Clone)]
pub struct PumpFunReplies {
    client: Client,
    base_url: String,
    limit: usize,
    max_chars: usize,
}

impl PumpFunReplies {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            client: http_client(),
            base_url: config.replies_url.trim_end_matches('/').to_string(),
            limit: config.poll_limit,
            max_chars: config.max_chat_chars,
        }
    }
}

#[async_trait]
impl PullSource for PumpFunReplies {
    fn name(&self) -> &'static str {
        "pumpfun-replies"
    }

    // The endpoint has no cursor support; overlap is absorbed by the poller.
    async fn fetch_recent(&self, asset: &str, _cursor: Option<&str>) -> FeedResult<Vec<PolledItem>> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, asset))?;
        url.query_pairs_mut()
            .append_pair("limit", &self.limit.to_string())
            .append_pair("offset", "0");
        let data = get_json(&self.client, url).await?;
        Ok(parse_replies(&data, self.max_chars))
    }
}

/// Recent trades for a token, used when the push feed is down
#[derive(Clone)]
pub struct PumpFunTrades {
    client: Client,
    base_url: String,
    limit: usize,
}

impl PumpFunTrades {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            client: http_client(),
            base_url: config.trades_url.trim_end_matches('/').to_string(),
            limit: config.poll_limit,
        }
    }
}

#[async_trait]
impl PullSource for PumpFunTrades {
    fn name(&self) -> &'static str {
        "pumpfun-trades"
    }

    async fn fetch_recent(&self, asset: &str, _cursor: Option<&str>) -> FeedResult<Vec<PolledItem>> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, asset))?;
        url.query_pairs_mut()
            .append_pair("limit", &self.limit.to_string())
            .append_pair("offset", "0")
            .append_pair("minimumSize", "0");
        let data = get_json(&self.client, url).await?;
        Ok(parse_trades(&data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_replies_author_fallbacks() {
        let data = json!([
            {"id": 7, "text": "gm", "username": "degen42", "timestamp": 1735732800000i64},
            {"id": "8", "text": "wen moon", "user": {"wallet": "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin"}},
            {"text": "hello", "user": "AbCdEfGhIjKl"},
            {"text": "anyone?"},
            {"text": "   "},
            {"id": 9}
        ]);

        let items = parse_replies(&data, 500);
        assert_eq!(items.len(), 4);

        let authors: Vec<String> = items
            .iter()
            .map(|i| match &i.event {
                Event::Chat(c) => c.author.clone(),
                other => panic!("expected chat, got {:?}", other),
            })
            .collect();
        assert_eq!(authors, vec!["degen42", "9xQeWvG8", "AbCdEfGh", "anon"]);
        assert_eq!(items[0].id.as_deref(), Some("7"));
        assert_eq!(items[1].id.as_deref(), Some("8"));
        assert!(items[2].id.is_none());

        match &items[0].event {
            Event::Chat(c) => assert_eq!(c.occurred_at.timestamp(), 1_735_732_800),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_parse_replies_clips_text() {
        let data = json!([{"text": "abcdefghij", "username": "u"}]);
        match &parse_replies(&data, 4)[0].event {
            Event::Chat(c) => assert_eq!(c.text, "abcd"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_parse_trades_converts_lamports() {
        let data = json!([
            {"signature": "sig1", "sol_amount": 1_500_000_000u64, "is_buy": true, "user": "w1", "timestamp": 1735732800},
            {"signature": "sig2", "sol_amount": 250_000_000u64, "is_buy": false, "user": "w2", "timestamp": 1735732801},
            {"signature": "sig3", "sol_amount": 0, "is_buy": true},
            {"signature": "sig4", "is_buy": true}
        ]);

        let items = parse_trades(&data);
        assert_eq!(items.len(), 2);
        match &items[0].event {
            Event::Trade(t) => {
                assert_eq!(t.kind, TradeKind::Buy);
                assert_eq!(t.quantity, 1.5);
                assert_eq!(t.actor, "w1");
                assert_eq!(t.occurred_at.timestamp(), 1_735_732_800);
            }
            _ => unreachable!(),
        }
        match &items[1].event {
            Event::Trade(t) => {
                assert_eq!(t.kind, TradeKind::Sell);
                assert_eq!(t.quantity, 0.25);
            }
            _ => unreachable!(),
        }
        assert_eq!(items[1].id.as_deref(), Some("sig2"));
    }

    #[test]
    fn test_parse_non_array_is_empty() {
        assert!(parse_replies(&json!({"error": "nope"}), 100).is_empty());
        assert!(parse_trades(&json!(null)).is_empty());
    }
}
