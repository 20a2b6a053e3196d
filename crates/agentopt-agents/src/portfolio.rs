use agentopt_models::{AgentConfig, AgentResult, PortfolioSummary, Trade};
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::agent::{unsupported, AgentRequest, AgentResponse, Method, OptimizedAgent};
use crate::base::BaseAgent;
use crate::error::AgentError;

/// Aggregates a set of trades into a `PortfolioSummary`.
///
/// Pure computation, so there is nothing to cache and nothing to fall back to.
pub struct PortfolioAgent {
    base: BaseAgent,
}

impl PortfolioAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            base: BaseAgent::new(config),
        }
    }

    pub async fn calculate_portfolio(&self, trades: &[Trade]) -> AgentResult<PortfolioSummary> {
        self.base
            .execute_without_fallback(None, |_| async move { summarize(trades) })
            .await
    }
}

/// Totals over closed trades. Open trades count toward `total_trades` only.
pub fn summarize(trades: &[Trade]) -> Result<PortfolioSummary, AgentError> {
    let mut summary = PortfolioSummary {
        total_trades: trades.len() as u64,
        ..PortfolioSummary::default()
    };

    for trade in trades {
        if trade.entry_price <= Decimal::ZERO {
            return Err(AgentError::Operation(format!(
                "Trade {} has non-positive entry price {}",
                trade.id, trade.entry_price
            )));
        }
        if trade.quantity <= Decimal::ZERO {
            return Err(AgentError::Operation(format!(
                "Trade {} has non-positive quantity {}",
                trade.id, trade.quantity
            )));
        }
        if !trade.values_in_range() {
            return Err(AgentError::Operation(format!(
                "Trade {} value out of range",
                trade.id
            )));
        }

        let Some(pnl) = trade.realized_pnl() else {
            continue;
        };
        summary.closed_trades += 1;
        summary.total_return = summary
            .total_return
            .checked_add(pnl)
            .ok_or_else(|| AgentError::Operation("Total return out of range".to_string()))?;
        if pnl > Decimal::ZERO {
            summary.winning_trades += 1;
        } else if pnl < Decimal::ZERO {
            summary.losing_trades += 1;
        }
    }

    if summary.closed_trades > 0 {
        let closed = Decimal::from(summary.closed_trades);
        summary.win_rate = percent(summary.winning_trades, closed);
        summary.loss_rate = percent(summary.losing_trades, closed);
        summary.average_return = (summary.total_return / closed).round_dp(2);
    }

    Ok(summary)
}

fn percent(count: u64, of: Decimal) -> Decimal {
    (Decimal::from(count) / of * Decimal::ONE_HUNDRED).round_dp(2)
}

#[async_trait]
impl OptimizedAgent for PortfolioAgent {
    fn base(&self) -> &BaseAgent {
        &self.base
    }

    fn capabilities(&self) -> &'static [Method] {
        &[Method::CalculatePortfolio]
    }

    async fn handle(&self, request: AgentRequest) -> Result<AgentResponse, AgentError> {
        match request {
            AgentRequest::CalculatePortfolio { trades } => Ok(AgentResponse::Portfolio(
                self.calculate_portfolio(&trades).await,
            )),
            other => Err(unsupported(self.id(), other.method())),
        }
    }
}
