//! Round-state feed for the Moon or Doom game (GraphQL API)

use crate::error::FeedError;
use crate::types::{PlayerEntry, Round, RoundResult, Side};
use alloy::primitives::Address;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

const ROUNDS_QUERY: &str = r#"
query MoDRounds($filter: MoDFilterInput!, $pagination: PaginationInput) {
  modRounds(filter: $filter, pagination: $pagination) {
    onChainId
    startedAt
    lockedAt
    closedAt
    moonPayoutRatio
    doomPayoutRatio
    status
  }
}
"#;

const ROUND_RESULT_QUERY: &str = r#"
query MoDRound($contract: MoDContract!, $id: Int, $player: Address) {
  modRound(contract: $contract, id: $id) {
    onChainId
    result {
      result
      payoutRatio
    }
    entries(player: $player) {
      moonPosition
      amount
      payoutAmount
    }
  }
}
"#;

/// Source of round snapshots
#[async_trait]
pub trait RoundFeed: Send + Sync {
    /// Most recent round, freshly fetched
    async fn latest_round(&self) -> Result<Round, FeedError>;
}

/// GraphQL client for the game's round feed
pub struct GraphQlFeed {
    client: Client,
    url: String,
    contract: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoundsData {
    mod_rounds: Vec<RawRound>,
}

/// Round as returned by the feed; every field may be missing
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRound {
    #[serde(default)]
    on_chain_id: Option<u64>,
    #[serde(default)]
    started_at: Option<String>,
    #[serde(default)]
    locked_at: Option<String>,
    #[serde(default)]
    closed_at: Option<String>,
    #[serde(default)]
    moon_payout_ratio: Option<Value>,
    #[serde(default)]
    doom_payout_ratio: Option<Value>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoundResultData {
    mod_round: Option<RawRoundResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRoundResult {
    on_chain_id: u64,
    #[serde(default)]
    result: Option<RawOutcome>,
    #[serde(default)]
    entries: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOutcome {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    payout_ratio: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    moon_position: bool,
    amount: Value,
    #[serde(default)]
    payout_amount: Option<Value>,
}

impl GraphQlFeed {
    pub fn new(url: impl Into<String>, contract: impl Into<String>) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            contract: contract.into(),
        })
    }

    async fn query<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T, FeedError> {
        let payload = json!({ "query": query, "variables": variables });

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Status { status, body });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FeedError::Malformed(e.to_string()))?;
        unwrap_graphql(body)
    }

    /// Settled result of a round and `player`'s entries in it
    pub async fn round_result(&self, on_chain_id: u64, player: Address) -> Result<RoundResult, FeedError> {
        let data: RoundResultData = self
            .query(
                ROUND_RESULT_QUERY,
                json!({
                    "contract": self.contract,
                    "id": on_chain_id,
                    "player": format!("{:?}", player),
                }),
            )
            .await?;

        let raw = data
            .mod_round
            .ok_or_else(|| FeedError::Malformed(format!("round {} not found", on_chain_id)))?;
        parse_round_result(raw)
    }
}

#[async_trait]
impl RoundFeed for GraphQlFeed {
    async fn latest_round(&self) -> Result<Round, FeedError> {
        let data: RoundsData = self
            .query(
                ROUNDS_QUERY,
                json!({
                    "filter": { "contract": self.contract },
                    "pagination": { "first": 1 },
                }),
            )
            .await?;

        debug!("[Feed] Fetched {} round(s)", data.mod_rounds.len());

        let raw = data
            .mod_rounds
            .into_iter()
            .next()
            .ok_or_else(|| FeedError::Malformed("feed returned no rounds".to_string()))?;
        parse_round(raw)
    }
}

fn unwrap_graphql<T: DeserializeOwned>(body: Value) -> Result<T, FeedError> {
    let response: GraphQlResponse<T> =
        serde_json::from_value(body).map_err(|e| FeedError::Malformed(e.to_string()))?;

    if let Some(errors) = response.errors.filter(|e| !e.is_empty()) {
        let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
        return Err(FeedError::Malformed(messages.join("; ")));
    }

    response
        .data
        .ok_or_else(|| FeedError::Malformed("response has no data".to_string()))
}

/// Parse an ISO-8601 timestamp with `Z` suffix into UTC
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, FeedError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FeedError::Malformed(format!("bad timestamp '{}': {}", raw, e)))
}

/// Payout ratios arrive as JSON numbers or numeric strings
fn number(field: &str, value: Option<&Value>) -> Result<f64, FeedError> {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| FeedError::Malformed(format!("missing or invalid {}", field)))
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn required<'a>(field: &str, value: &'a Option<String>) -> Result<&'a str, FeedError> {
    value
        .as_deref()
        .ok_or_else(|| FeedError::Malformed(format!("missing {}", field)))
}

fn parse_round(raw: RawRound) -> Result<Round, FeedError> {
    Ok(Round {
        on_chain_id: raw
            .on_chain_id
            .ok_or_else(|| FeedError::Malformed("missing onChainId".to_string()))?,
        started_at: parse_timestamp(required("startedAt", &raw.started_at)?)?,
        locked_at: parse_timestamp(required("lockedAt", &raw.locked_at)?)?,
        closed_at: parse_timestamp(required("closedAt", &raw.closed_at)?)?,
        moon_payout_ratio: number("moonPayoutRatio", raw.moon_payout_ratio.as_ref())?,
        doom_payout_ratio: number("doomPayoutRatio", raw.doom_payout_ratio.as_ref())?,
        status: raw.status.unwrap_or_default(),
    })
}

fn parse_round_result(raw: RawRoundResult) -> Result<RoundResult, FeedError> {
    let (outcome, payout_ratio) = match raw.result {
        Some(result) => {
            let ratio = match result.payout_ratio {
                Some(Value::Null) | None => None,
                Some(v) => Some(number("payoutRatio", Some(&v))?),
            };
            (result.result, ratio)
        }
        None => (None, None),
    };

    let entries = raw
        .entries
        .into_iter()
        .map(|e| PlayerEntry {
            side: if e.moon_position { Side::Moon } else { Side::Doom },
            amount: text(&e.amount),
            payout_amount: e.payout_amount.filter(|v| !v.is_null()).map(|v| text(&v)),
        })
        .collect();

    Ok(RoundResult {
        on_chain_id: raw.on_chain_id,
        outcome,
        payout_ratio,
        entries,
    })
}
