//! 3Commas response records
//!
//! Payloads are loosely typed: numbers arrive as JSON numbers or strings,
//! balances are sometimes nested, ids may be numeric. Every field read by
//! the metrics code is an `Option` here, and interpreting it is left to
//! `metrics`, which falls back to zero instead of failing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// `profits_in_usd` block from `/ver1/bots/stats`; values kept as reported
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProfitData {
    #[serde(default)]
    pub overall_usd_profit: Option<Value>,
    #[serde(default)]
    pub today_usd_profit: Option<Value>,
    #[serde(default)]
    pub active_deals_usd_profit: Option<Value>,
    #[serde(default)]
    pub funds_locked_in_active_deals: Option<Value>,
}

impl ProfitData {
    /// Read a field by its sensor key
    pub fn get(&self, key: &str) -> Option<&Value> {
        match key {
            "overall_usd_profit" => self.overall_usd_profit.as_ref(),
            "today_usd_profit" => self.today_usd_profit.as_ref(),
            "active_deals_usd_profit" => self.active_deals_usd_profit.as_ref(),
            "funds_locked_in_active_deals" => self.funds_locked_in_active_deals.as_ref(),
            _ => None,
        }
        .filter(|v| !v.is_null())
    }

    pub fn is_empty(&self) -> bool {
        *self == ProfitData::default()
    }

    /// Extract `profits_in_usd` from a bot-stats payload.
    /// `None` when the key is missing or not an object.
    pub fn from_bot_stats(stats: &Value) -> Option<Self> {
        let profits = stats.get("profits_in_usd")?;
        if !profits.is_object() {
            return None;
        }
        serde_json::from_value(profits.clone()).ok()
    }
}

/// Connected exchange account or wallet
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Account {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub exchange_name: Option<String>,
    /// USD balance: number, numeric string, or `{ "amount": ... }`
    #[serde(default, alias = "balance", alias = "usd_balance")]
    pub usd_amount: Option<Value>,
    #[serde(default)]
    pub market_code: Option<String>,
}

impl Account {
    pub fn id_string(&self) -> Option<String> {
        self.id.as_ref().and_then(id_string)
    }

    /// Human label: name if present, else id
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| self.id_string())
            .unwrap_or_default()
    }
}

/// DCA bot definition
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Bot {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub account_id: Option<Value>,
    /// e.g. `"10.0"` or `"10.0 USDT"`
    #[serde(default)]
    pub base_order_volume: Option<Value>,
    #[serde(default)]
    pub safety_order_volume: Option<Value>,
    #[serde(default)]
    pub max_safety_orders: Option<Value>,
    #[serde(default)]
    pub max_active_deals: Option<Value>,
    /// Parsed but not part of the investment formula
    #[serde(default)]
    pub martingale_volume_coefficient: Option<Value>,
    #[serde(default)]
    pub leverage_custom_value: Option<Value>,
}

impl Bot {
    pub fn id_string(&self) -> Option<String> {
        self.id.as_ref().and_then(id_string)
    }

    pub fn account_id_string(&self) -> Option<String> {
        self.account_id.as_ref().and_then(id_string)
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| self.id_string())
            .unwrap_or_else(|| "unnamed bot".to_string())
    }
}

/// Normalise a JSON id (number or string) to a string
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Decode a JSON list element by element, skipping entries that are not
/// objects. A non-list payload (e.g. `{}` from a 204) yields an empty list.
pub fn decode_list<T: serde::de::DeserializeOwned>(payload: Value, what: &str) -> Vec<T> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(ref map) if map.is_empty() => return Vec::new(),
        Value::Null => return Vec::new(),
        other => {
            warn!("Expected a list of {}, got: {}", what, other);
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<T>(item.clone()) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!("Skipping malformed {} entry {}: {}", what, item, e);
                None
            }
        })
        .collect()
}
