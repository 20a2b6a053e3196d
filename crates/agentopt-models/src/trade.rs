use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    Long,
    Short,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Long => "long",
            TradeDirection::Short => "short",
        }
    }

    /// Parses the spellings brokers commonly export.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "long" | "buy" => Some(TradeDirection::Long),
            "short" | "sell" => Some(TradeDirection::Short),
            _ => None,
        }
    }
}

/// A trade as it arrives from an import or form, before validation.
///
/// Price fields are raw JSON so both `150.25` and `"150.25"` are accepted
/// and anything else can be reported back field by field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TradeRecord {
    pub id: Option<Uuid>,
    pub user_id: Option<String>,
    pub symbol: Option<String>,
    pub direction: Option<String>,
    pub entry_price: Option<serde_json::Value>,
    pub exit_price: Option<serde_json::Value>,
    pub stop_loss: Option<serde_json::Value>,
    pub take_profit: Option<serde_json::Value>,
    pub quantity: Option<serde_json::Value>,
    pub entry_time: Option<DateTime<Utc>>,
    pub exit_time: Option<DateTime<Utc>>,
}

/// A validated trade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trade {
    pub id: Uuid,
    pub user_id: String,
    pub symbol: String,
    pub direction: TradeDirection,
    pub entry_price: Decimal,
    /// None while the position is still open.
    pub exit_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub quantity: Decimal,
    pub entry_time: Option<DateTime<Utc>>,
    pub exit_time: Option<DateTime<Utc>>,
}

impl Trade {
    pub fn is_closed(&self) -> bool {
        self.exit_price.is_some()
    }

    /// Profit or loss of a closed trade, signed by direction. `None` for an
    /// open trade or when the figure does not fit in a `Decimal`.
    pub fn realized_pnl(&self) -> Option<Decimal> {
        let exit = self.exit_price?;
        let per_share = match self.direction {
            TradeDirection::Long => exit.checked_sub(self.entry_price),
            TradeDirection::Short => self.entry_price.checked_sub(exit),
        }?;
        per_share.checked_mul(self.quantity)
    }

    /// Capital committed at entry.
    pub fn notional(&self) -> Option<Decimal> {
        self.entry_price.checked_mul(self.quantity)
    }

    /// Percent return on the capital committed at entry.
    pub fn return_percent(&self) -> Option<Decimal> {
        let pnl = self.realized_pnl()?;
        let cost = self.notional()?;
        if cost.is_zero() {
            return None;
        }
        pnl.checked_div(cost)?
            .checked_mul(Decimal::ONE_HUNDRED)
            .map(|percent| percent.round_dp(2))
    }

    /// False when the notional, or the realized P&L of a closed trade,
    /// overflows a `Decimal`.
    pub fn values_in_range(&self) -> bool {
        self.notional().is_some() && (!self.is_closed() || self.realized_pnl().is_some())
    }
}

/// A trade plus the fields derived from it after validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichedTrade {
    #[serde(flatten)]
    pub trade: Trade,
    pub risk_reward_ratio: Option<Decimal>,
    pub duration_minutes: Option<i64>,
    pub realized_pnl: Option<Decimal>,
    pub return_percent: Option<Decimal>,
}
