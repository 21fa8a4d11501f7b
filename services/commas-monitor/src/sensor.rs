//! Sensor projection: read-only numeric values pulled from a snapshot

use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::config::{ATTRIBUTION, DOMAIN};
use crate::coordinator::Snapshot;

/// Static description of a sensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorDescription {
    pub key: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub unit: &'static str,
}

pub const CURRENCY_DOLLAR: &str = "$";
pub const PERCENTAGE: &str = "%";

pub const PROFIT_SENSORS: [SensorDescription; 4] = [
    SensorDescription {
        key: "overall_usd_profit",
        name: "Overall USD Profit",
        icon: "mdi:currency-usd",
        unit: CURRENCY_DOLLAR,
    },
    SensorDescription {
        key: "today_usd_profit",
        name: "Today's USD Profit",
        icon: "mdi:currency-usd",
        unit: CURRENCY_DOLLAR,
    },
    SensorDescription {
        key: "active_deals_usd_profit",
        name: "Active Deals USD Profit",
        icon: "mdi:currency-usd",
        unit: CURRENCY_DOLLAR,
    },
    SensorDescription {
        key: "funds_locked_in_active_deals",
        name: "Funds Locked in Active Deals",
        icon: "mdi:currency-usd-off",
        unit: CURRENCY_DOLLAR,
    },
];

pub const ACCOUNT_SENSORS: [SensorDescription; 3] = [
    SensorDescription {
        key: "utilization_percentage",
        name: "Utilization",
        icon: "mdi:percent",
        unit: PERCENTAGE,
    },
    SensorDescription {
        key: "total_investment_amount",
        name: "Total Investment",
        icon: "mdi:cash-multiple",
        unit: CURRENCY_DOLLAR,
    },
    SensorDescription {
        key: "balance",
        name: "Balance",
        icon: "mdi:wallet",
        unit: CURRENCY_DOLLAR,
    },
];

pub const BOT_INVESTMENT_SENSOR: SensorDescription = SensorDescription {
    key: "investment_amount",
    name: "Investment",
    icon: "mdi:robot",
    unit: CURRENCY_DOLLAR,
};

/// Where in the snapshot a sensor reads from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SensorSource {
    Profit,
    Account { account_id: String },
    /// Looked up by bot id; bots without one fall back to list position
    Bot {
        account_id: String,
        bot_id: Option<String>,
        index: usize,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct Sensor {
    pub unique_id: String,
    pub name: String,
    /// Device the sensor groups under
    pub device: String,
    pub attribution: &'static str,
    pub description: SensorDescription,
    pub source: SensorSource,
}

impl Sensor {
    /// Current value; `None` when the data is absent or not numeric
    pub fn native_value(&self, snapshot: &Snapshot) -> Option<f64> {
        match &self.source {
            SensorSource::Profit => snapshot
                .profit_data
                .get(self.description.key)
                .and_then(|value| to_float(value, &self.unique_id)),
            SensorSource::Account { account_id } => {
                let metrics = snapshot.accounts.get(account_id)?;
                match self.description.key {
                    "utilization_percentage" => Some(metrics.utilization_percentage),
                    "total_investment_amount" => Some(metrics.total_investment_amount),
                    "balance" => Some(metrics.account_balance),
                    _ => None,
                }
            }
            SensorSource::Bot {
                account_id,
                bot_id,
                index,
            } => {
                let bots = snapshot.bots.get(account_id)?;
                let bot = match bot_id {
                    Some(bot_id) => bots
                        .iter()
                        .find(|b| b.bot.id_string().as_deref() == Some(bot_id.as_str())),
                    None => bots.get(*index).filter(|b| b.bot.id_string().is_none()),
                };
                bot.map(|b| b.investment_amount)
            }
        }
    }
}

fn to_float(value: &Value, sensor: &str) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    if parsed.is_none() {
        error!("{}: unable to convert {} to float", sensor, value);
    }
    parsed
}

fn unique_id(entry_id: &str, parts: &[&str]) -> String {
    let mut id = format!("{}_{}", DOMAIN, entry_id);
    for part in parts {
        id.push('_');
        id.push_str(part);
    }
    id
}

/// All sensors for one entry given the accounts and bots in `snapshot`
pub fn sensors_for(entry_id: &str, snapshot: &Snapshot) -> Vec<Sensor> {
    let mut sensors: Vec<Sensor> = PROFIT_SENSORS
        .iter()
        .map(|description| Sensor {
            unique_id: unique_id(entry_id, &[description.key]),
            name: format!("3Commas {}", description.name),
            device: "3Commas".to_string(),
            attribution: ATTRIBUTION,
            description: *description,
            source: SensorSource::Profit,
        })
        .collect();

    let mut account_ids: Vec<&String> = snapshot.accounts.keys().collect();
    account_ids.sort();

    for account_id in account_ids {
        let metrics = &snapshot.accounts[account_id];
        let device = format!("3Commas Account {}", metrics.account.display_name());

        for description in ACCOUNT_SENSORS.iter() {
            sensors.push(Sensor {
                unique_id: unique_id(entry_id, &[account_id.as_str(), description.key]),
                name: format!("{} {}", device, description.name),
                device: device.clone(),
                attribution: ATTRIBUTION,
                description: *description,
                source: SensorSource::Account {
                    account_id: account_id.clone(),
                },
            });
        }

        for (index, bot) in snapshot.bots.get(account_id).into_iter().flatten().enumerate() {
            let bot_id = bot.bot.id_string();
            let bot_key = bot_id.clone().unwrap_or_else(|| index.to_string());
            sensors.push(Sensor {
                unique_id: unique_id(
                    entry_id,
                    &[account_id.as_str(), "bot", bot_key.as_str(), BOT_INVESTMENT_SENSOR.key],
                ),
                name: format!("3Commas {} {}", bot.bot.display_name(), BOT_INVESTMENT_SENSOR.name),
                device: device.clone(),
                attribution: ATTRIBUTION,
                description: BOT_INVESTMENT_SENSOR,
                source: SensorSource::Bot {
                    account_id: account_id.clone(),
                    bot_id,
                    index,
                },
            });
        }
    }

    sensors
}
