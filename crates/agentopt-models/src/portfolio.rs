use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggregate performance over a set of trades. Rates are percentages.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PortfolioSummary {
    pub total_trades: u64,
    pub closed_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    /// Sum of realized pnl across closed trades.
    pub total_return: Decimal,
    pub win_rate: Decimal,
    pub loss_rate: Decimal,
    /// Mean realized pnl per closed trade.
    pub average_return: Decimal,
}
