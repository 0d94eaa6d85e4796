//! One-shot HTTP lookups: account info over JSON-RPC and the USD price
//!
//! Neither lookup retries or caches. Callers surface failures as notices
//! and carry on with a neutral value.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::LookupConfig;
use crate::monitor::record::drops_to_xrp;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("account {0} not found")]
    NotFound(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Balance and state of a ledger account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub account: String,
    /// Balance in XRP
    pub balance: f64,
    pub sequence: u64,
    pub flags: u64,
}

pub struct LookupClient {
    http: reqwest::Client,
    rpc_url: String,
    price_url: String,
}

impl LookupClient {
    pub fn new(
        rpc_url: impl Into<String>,
        price_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            rpc_url: rpc_url.into(),
            price_url: price_url.into(),
        })
    }

    pub fn from_config(config: &LookupConfig) -> Result<Self, LookupError> {
        Self::new(config.rpc_url.clone(), config.price_url.clone(), config.timeout())
    }

    /// `account_info` against the validated ledger
    pub async fn account_info(&self, address: &str) -> Result<AccountInfo, LookupError> {
        let payload = json!({
            "method": "account_info",
            "params": [{ "account": address, "ledger_index": "validated" }],
        });

        let response = self.http.post(&self.rpc_url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(LookupError::Status(response.status().as_u16()));
        }

        let body: Value = response.json().await?;
        parse_account_info(address, &body)
    }

    /// Current XRP/USD price
    pub async fn xrp_price_usd(&self) -> Result<f64, LookupError> {
        let response = self.http.get(&self.price_url).send().await?;
        if !response.status().is_success() {
            return Err(LookupError::Status(response.status().as_u16()));
        }

        let body: Value = response.json().await?;
        body.pointer("/ripple/usd")
            .and_then(Value::as_f64)
            .ok_or_else(|| LookupError::Malformed("missing ripple.usd".to_string()))
    }

    /// Price, or 0 with a logged notice on any failure
    pub async fn xrp_price_or_zero(&self) -> f64 {
        match self.xrp_price_usd().await {
            Ok(price) => price,
            Err(e) => {
                tracing::warn!(error = %e, "Price lookup failed");
                0.0
            }
        }
    }
}

fn parse_account_info(address: &str, body: &Value) -> Result<AccountInfo, LookupError> {
    let result = body
        .get("result")
        .ok_or_else(|| LookupError::Malformed("missing result".to_string()))?;

    if result.get("status").and_then(Value::as_str) != Some("success") {
        return Err(LookupError::NotFound(address.to_string()));
    }

    let data = result
        .get("account_data")
        .ok_or_else(|| LookupError::Malformed("missing account_data".to_string()))?;

    let balance_drops = match data.get("Balance") {
        Some(Value::String(s)) => s
            .parse::<u64>()
            .map_err(|_| LookupError::Malformed(format!("bad Balance {:?}", s)))?,
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| LookupError::Malformed("bad Balance".to_string()))?,
        _ => 0,
    };

    Ok(AccountInfo {
        account: data
            .get("Account")
            .and_then(Value::as_str)
            .unwrap_or(address)
            .to_string(),
        balance: drops_to_xrp(balance_drops),
        sequence: data.get("Sequence").and_then(Value::as_u64).unwrap_or(0),
        flags: data.get("Flags").and_then(Value::as_u64).unwrap_or(0),
    })
}
