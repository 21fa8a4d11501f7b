//! Derived metrics: per-bot investment sizing and per-account utilization
//!
//! Nothing in here returns an error. Inputs that cannot be read as numbers
//! are logged and replaced with zero so one malformed bot or account never
//! stops the rest from being processed.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::models::{Account, Bot};

/// Why a numeric field could not be read
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NumericError {
    #[error("missing field {0}")]
    Missing(&'static str),
    #[error("field {field} is not numeric: {value}")]
    NotNumeric { field: &'static str, value: String },
}

/// A bot with its computed capital commitment
#[derive(Debug, Clone, Serialize)]
pub struct BotInvestment {
    pub bot: Bot,
    pub investment_amount: f64,
}

/// An account with its aggregated metrics
#[derive(Debug, Clone, Serialize)]
pub struct AccountMetrics {
    pub account: Account,
    pub account_balance: f64,
    pub total_investment_amount: f64,
    pub utilization_percentage: f64,
}

/// Output of [`derive`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct DerivedMetrics {
    /// Keyed by account id
    pub accounts: HashMap<String, AccountMetrics>,
    /// Keyed by account id
    pub bots: HashMap<String, Vec<BotInvestment>>,
}

/// Read a volume such as `100`, `"100.5"` or `"100.5 USDT"`
pub fn parse_volume(value: Option<&Value>, field: &'static str) -> Result<f64, NumericError> {
    match value {
        None | Some(Value::Null) => Err(NumericError::Missing(field)),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| NumericError::NotNumeric {
            field,
            value: n.to_string(),
        }),
        Some(Value::String(s)) => {
            let numeric = s.trim().split(' ').next().unwrap_or_default();
            numeric
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| NumericError::NotNumeric {
                    field,
                    value: s.clone(),
                })
        }
        Some(other) => Err(NumericError::NotNumeric {
            field,
            value: other.to_string(),
        }),
    }
}

/// Read an order count; accepts integers, integral floats and numeric strings
pub fn parse_count(value: Option<&Value>, field: &'static str) -> Result<f64, NumericError> {
    let parsed = parse_volume(value, field)?;
    if parsed < 0.0 || parsed.fract() != 0.0 {
        return Err(NumericError::NotNumeric {
            field,
            value: parsed.to_string(),
        });
    }
    Ok(parsed)
}

fn try_investment_amount(bot: &Bot) -> Result<f64, NumericError> {
    let base = parse_volume(bot.base_order_volume.as_ref(), "base_order_volume")?;
    let safety = parse_volume(bot.safety_order_volume.as_ref(), "safety_order_volume")?;
    let max_safety_orders = parse_count(bot.max_safety_orders.as_ref(), "max_safety_orders")?;
    let max_active_deals = parse_count(bot.max_active_deals.as_ref(), "max_active_deals")?;

    let total_safety_volume = safety * max_safety_orders;
    let single_deal_investment = base + total_safety_volume;
    let total_investment = single_deal_investment * max_active_deals;

    let leverage = match bot.leverage_custom_value.as_ref() {
        None | Some(Value::Null) => None,
        value => Some(parse_volume(value, "leverage_custom_value")?),
    };

    Ok(match leverage {
        Some(leverage) if leverage > 0.0 => total_investment / leverage,
        _ => total_investment,
    })
}

/// Capital a bot can commit across all of its active deals; 0.0 on bad input
pub fn investment_amount(bot: &Bot) -> f64 {
    match try_investment_amount(bot) {
        Ok(amount) if amount.is_finite() && amount >= 0.0 => amount,
        Ok(amount) => {
            warn!(
                "Bot {}: investment amount {} out of range, using 0.0",
                bot.display_name(),
                amount
            );
            0.0
        }
        Err(e) => {
            warn!(
                "Bot {}: cannot compute investment amount ({}), using 0.0",
                bot.display_name(),
                e
            );
            0.0
        }
    }
}

/// USD balance of an account: bare value or `{ "amount": ... }`; 0.0 on bad input
pub fn account_balance(account: &Account) -> f64 {
    let raw = match account.usd_amount.as_ref() {
        Some(Value::Object(map)) => map.get("amount"),
        other => other,
    };

    match parse_volume(raw, "usd_amount") {
        Ok(balance) => balance,
        Err(e) => {
            warn!(
                "Account {}: cannot read balance ({}), using 0.0",
                account.display_name(),
                e
            );
            0.0
        }
    }
}

/// Round half away from zero to two decimals
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Share of the balance committed to bots, in percent; 0.0 without a balance
pub fn utilization_percentage(total_investment: f64, balance: f64) -> f64 {
    if balance > 0.0 {
        round2(total_investment / balance * 100.0)
    } else {
        0.0
    }
}

/// Compute bot investments and account utilization.
///
/// `bots_by_account` is keyed by account id; accounts without an id or
/// without an entry in the map get a zero investment total.
pub fn derive(accounts: &[Account], bots_by_account: &HashMap<String, Vec<Bot>>) -> DerivedMetrics {
    let mut derived = DerivedMetrics::default();

    for (account_id, bots) in bots_by_account {
        let with_investment = bots
            .iter()
            .map(|bot| BotInvestment {
                investment_amount: investment_amount(bot),
                bot: bot.clone(),
            })
            .collect();
        derived.bots.insert(account_id.clone(), with_investment);
    }

    for account in accounts {
        let Some(account_id) = account.id_string() else {
            debug!("Skipping account without id: {:?}", account.name);
            continue;
        };

        let total_investment_amount: f64 = derived
            .bots
            .get(&account_id)
            .map(|bots| bots.iter().map(|b| b.investment_amount).sum())
            .unwrap_or(0.0);
        let balance = account_balance(account);

        derived.accounts.insert(
            account_id,
            AccountMetrics {
                account: account.clone(),
                account_balance: balance,
                total_investment_amount,
                utilization_percentage: utilization_percentage(total_investment_amount, balance),
            },
        );
    }

    derived
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bot(base: Value, safety: Value, max_so: Value, max_deals: Value, leverage: Option<Value>) -> Bot {
        Bot {
            id: Some(json!(1)),
            name: Some("test bot".into()),
            account_id: Some(json!(10)),
            base_order_volume: Some(base),
            safety_order_volume: Some(safety),
            max_safety_orders: Some(max_so),
            max_active_deals: Some(max_deals),
            martingale_volume_coefficient: Some(json!("1.05")),
            leverage_custom_value: leverage,
        }
    }

    #[test]
    fn test_investment_amount_without_leverage() {
        let b = bot(json!(100), json!(50), json!(2), json!(3), None);
        assert_eq!(investment_amount(&b), 600.0);
    }

    #[test]
    fn test_investment_amount_with_leverage() {
        let b = bot(json!("100"), json!("50"), json!(2), json!(3), Some(json!("4")));
        assert_eq!(investment_amount(&b), 150.0);
    }

    #[test]
    fn test_non_positive_leverage_is_ignored() {
        let zero = bot(json!(100), json!(50), json!(2), json!(3), Some(json!(0)));
        assert_eq!(investment_amount(&zero), 600.0);

        let null = bot(json!(100), json!(50), json!(2), json!(3), Some(Value::Null));
        assert_eq!(investment_amount(&null), 600.0);
    }

    #[test]
    fn test_volume_with_unit_suffix() {
        let b = bot(json!("10.5 USDT"), json!("20 USDT"), json!("1"), json!("2"), None);
        assert_eq!(investment_amount(&b), 61.0);
    }

    #[test]
    fn test_non_numeric_volume_yields_zero() {
        let b = bot(json!("n/a"), json!(50), json!(2), json!(3), None);
        assert_eq!(investment_amount(&b), 0.0);

        let mut missing = bot(json!(100), json!(50), json!(2), json!(3), None);
        missing.max_active_deals = None;
        assert_eq!(investment_amount(&missing), 0.0);

        let wrong_type = bot(json!([1, 2]), json!(50), json!(2), json!(3), None);
        assert_eq!(investment_amount(&wrong_type), 0.0);
    }

    #[test]
    fn test_parse_volume_errors() {
        assert_eq!(
            parse_volume(None, "base_order_volume"),
            Err(NumericError::Missing("base_order_volume"))
        );
        assert!(parse_volume(Some(&json!("")), "x").is_err());
        assert_eq!(parse_volume(Some(&json!(" 7.5 BTC")), "x"), Ok(7.5));
    }

    #[test]
    fn test_fractional_count_is_rejected() {
        assert_eq!(parse_count(Some(&json!("3")), "max_active_deals"), Ok(3.0));
        assert_eq!(parse_count(Some(&json!(2.0)), "max_safety_orders"), Ok(2.0));
        assert!(matches!(
            parse_count(Some(&json!("2.7")), "max_safety_orders"),
            Err(NumericError::NotNumeric { .. })
        ));
        assert!(parse_count(Some(&json!(-1)), "max_active_deals").is_err());

        let b = bot(json!(100), json!(50), json!("2.7"), json!(3), None);
        assert_eq!(investment_amount(&b), 0.0);
    }

    #[test]
    fn test_account_balance_forms() {
        let mut account = Account {
            id: Some(json!(1)),
            usd_amount: Some(json!("1000")),
            ..Default::default()
        };
        assert_eq!(account_balance(&account), 1000.0);

        account.usd_amount = Some(json!({"amount": 250.5}));
        assert_eq!(account_balance(&account), 250.5);

        account.usd_amount = Some(json!({"currency": "USD"}));
        assert_eq!(account_balance(&account), 0.0);

        account.usd_amount = Some(json!("lots"));
        assert_eq!(account_balance(&account), 0.0);
    }

    #[test]
    fn test_utilization() {
        assert_eq!(utilization_percentage(150.0, 0.0), 0.0);
        assert_eq!(utilization_percentage(150.0, 1000.0), 15.0);
        assert_eq!(utilization_percentage(1.0, 3.0), 33.33);
        assert_eq!(utilization_percentage(150.0, -5.0), 0.0);
    }

    #[test]
    fn test_derive_aggregates_per_account() {
        let accounts = vec![
            Account {
                id: Some(json!(10)),
                name: Some("Main".into()),
                usd_amount: Some(json!({"amount": "1000"})),
                ..Default::default()
            },
            Account {
                id: Some(json!("20")),
                usd_amount: Some(json!(0)),
                ..Default::default()
            },
            Account {
                id: None,
                name: Some("orphan".into()),
                ..Default::default()
            },
        ];

        let mut bots_by_account = HashMap::new();
        bots_by_account.insert(
            "10".to_string(),
            vec![
                bot(json!(100), json!(50), json!(2), json!(3), Some(json!(4))),
                bot(json!("n/a"), json!(50), json!(2), json!(3), None),
            ],
        );
        bots_by_account.insert(
            "20".to_string(),
            vec![bot(json!(100), json!(50), json!(2), json!(3), None)],
        );

        let derived = derive(&accounts, &bots_by_account);
        assert_eq!(derived.accounts.len(), 2);

        let main = &derived.accounts["10"];
        assert_eq!(main.total_investment_amount, 150.0);
        assert_eq!(main.account_balance, 1000.0);
        assert_eq!(main.utilization_percentage, 15.0);

        let empty_balance = &derived.accounts["20"];
        assert_eq!(empty_balance.total_investment_amount, 600.0);
        assert_eq!(empty_balance.utilization_percentage, 0.0);

        let amounts: Vec<f64> = derived.bots["10"].iter().map(|b| b.investment_amount).collect();
        assert_eq!(amounts, vec![150.0, 0.0]);
    }
}
