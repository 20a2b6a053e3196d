use std::fmt;

use agentopt_models::{AgentConfig, AgentResult, EnrichedTrade, Trade, TradeDirection, TradeRecord};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

use crate::agent::{unsupported, AgentRequest, AgentResponse, Method, OptimizedAgent};
use crate::base::BaseAgent;
use crate::error::AgentError;

/// A single problem found in a `TradeRecord`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: &'static str,
    pub message: &'static str,
}

impl ValidationIssue {
    fn new(field: &'static str, message: &'static str) -> Self {
        Self { field, message }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message)
    }
}

/// Validates incoming trades and derives the fields reports need.
pub struct TradeAgent {
    base: BaseAgent,
}

impl TradeAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            base: BaseAgent::new(config),
        }
    }

    /// Every issue in `record`, in field order. Empty when the record is valid.
    pub fn validate(record: &TradeRecord) -> Vec<ValidationIssue> {
        parse_record(record).err().unwrap_or_default()
    }

    pub async fn process(&self, record: &TradeRecord) -> AgentResult<EnrichedTrade> {
        self.base
            .execute_without_fallback(None, |_| async move {
                let trade = parse_record(record).map_err(|issues| {
                    AgentError::Validation(issues.iter().map(ToString::to_string).collect())
                })?;
                Ok(enrich(trade))
            })
            .await
    }
}

/// Derive risk/reward, holding time and realized figures for a valid trade.
pub fn enrich(trade: Trade) -> EnrichedTrade {
    let risk_reward_ratio = match (trade.stop_loss, trade.take_profit) {
        (Some(stop), Some(target)) => {
            let risk = (trade.entry_price - stop).abs();
            let reward = (target - trade.entry_price).abs();
            reward.checked_div(risk).map(|ratio| ratio.round_dp(2))
        }
        _ => None,
    };

    let duration_minutes = match (trade.entry_time, trade.exit_time) {
        (Some(entry), Some(exit)) => Some((exit - entry).num_minutes()),
        _ => None,
    };

    EnrichedTrade {
        risk_reward_ratio,
        duration_minutes,
        realized_pnl: trade.realized_pnl(),
        return_percent: trade.return_percent(),
        trade,
    }
}

fn parse_record(record: &TradeRecord) -> Result<Trade, Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    let symbol = match record.symbol.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => Some(s.to_ascii_uppercase()),
        _ => {
            issues.push(ValidationIssue::new("symbol", "Missing symbol"));
            None
        }
    };

    let direction = match record.direction.as_deref() {
        None => {
            issues.push(ValidationIssue::new("direction", "Missing direction"));
            None
        }
        Some(raw) => {
            let parsed = TradeDirection::parse(raw);
            if parsed.is_none() {
                issues.push(ValidationIssue::new("direction", "Invalid direction"));
            }
            parsed
        }
    };

    let entry_price = match present(&record.entry_price) {
        None => {
            issues.push(ValidationIssue::new("entry_price", "Missing entry price"));
            None
        }
        Some(value) => {
            let parsed = positive_decimal(value);
            if parsed.is_none() {
                issues.push(ValidationIssue::new("entry_price", "Invalid entry price"));
            }
            parsed
        }
    };

    let mut optional = |value: &Option<Value>, field: &'static str, message: &'static str| {
        let value = present(value)?;
        let parsed = positive_decimal(value);
        if parsed.is_none() {
            issues.push(ValidationIssue::new(field, message));
        }
        parsed
    };
    let exit_price = optional(&record.exit_price, "exit_price", "Invalid exit price");
    let stop_loss = optional(&record.stop_loss, "stop_loss", "Invalid stop loss");
    let take_profit = optional(&record.take_profit, "take_profit", "Invalid take profit");
    let quantity = optional(&record.quantity, "quantity", "Invalid quantity");

    if let (Some(entry), Some(exit)) = (record.entry_time, record.exit_time) {
        if exit < entry {
            issues.push(ValidationIssue::new("exit_time", "Exit time before entry time"));
        }
    }

    let (Some(symbol), Some(direction), Some(entry_price)) = (symbol, direction, entry_price) else {
        return Err(issues);
    };
    if !issues.is_empty() {
        return Err(issues);
    }

    let trade = Trade {
        id: record.id.unwrap_or_else(Uuid::new_v4),
        user_id: record.user_id.clone().unwrap_or_default(),
        symbol,
        direction,
        entry_price,
        exit_price,
        stop_loss,
        take_profit,
        quantity: quantity.unwrap_or(Decimal::ONE),
        entry_time: record.entry_time,
        exit_time: record.exit_time,
    };
    if !trade.values_in_range() {
        return Err(vec![ValidationIssue::new("quantity", "Trade value out of range")]);
    }
    Ok(trade)
}

/// JSON `null` counts as absent.
fn present(value: &Option<Value>) -> Option<&Value> {
    value.as_ref().filter(|v| !v.is_null())
}

fn positive_decimal(value: &Value) -> Option<Decimal> {
    let parsed = match value {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => parse_decimal(s.trim()),
        _ => None,
    }?;
    (parsed > Decimal::ZERO).then_some(parsed)
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    raw.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

#[async_trait]
impl OptimizedAgent for TradeAgent {
    fn base(&self) -> &BaseAgent {
        &self.base
    }

    fn capabilities(&self) -> &'static [Method] {
        &[Method::ProcessTrade]
    }

    async fn handle(&self, request: AgentRequest) -> Result<AgentResponse, AgentError> {
        match request {
            AgentRequest::ProcessTrade(record) => {
                Ok(AgentResponse::ProcessedTrade(self.process(&record).await))
            }
            other => Err(unsupported(self.id(), other.method())),
        }
    }
}
