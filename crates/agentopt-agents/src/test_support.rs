//! Mock collaborators and fixtures shared by unit and integration tests.
//!
//! The mocks count their calls and can be slowed down or made to fail, which
//! is all the agents' cache, timeout and fallback paths need to be observed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use agentopt_models::{
    PortfolioSummary, RiskLevel, Trade, TradeAnalysis, TradeDirection, TradeRecord,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::ai::TradeAnalyzer;
use crate::database::TradeStore;
use crate::error::AgentError;
use crate::portfolio::summarize;

/// A closed long trade for user `u1`: exit +10, stop -5, target +15, quantity 10.
pub fn sample_trade(symbol: &str, entry: Decimal) -> Trade {
    Trade {
        id: Uuid::new_v4(),
        user_id: "u1".to_string(),
        symbol: symbol.to_string(),
        direction: TradeDirection::Long,
        entry_price: entry,
        exit_price: Some(entry + Decimal::TEN),
        stop_loss: Some(entry - Decimal::new(5, 0)),
        take_profit: Some(entry + Decimal::new(15, 0)),
        quantity: Decimal::TEN,
        entry_time: None,
        exit_time: None,
    }
}

/// A valid raw record equivalent to `sample_trade("AAPL", 100)`.
pub fn sample_record() -> TradeRecord {
    TradeRecord {
        id: None,
        user_id: Some("u1".to_string()),
        symbol: Some("AAPL".to_string()),
        direction: Some("long".to_string()),
        entry_price: Some(json!(100)),
        exit_price: Some(json!(110)),
        stop_loss: Some(json!(95)),
        take_profit: Some(json!(115)),
        quantity: Some(json!(10)),
        entry_time: None,
        exit_time: None,
    }
}

/// Sleep for `delay`, or fail with `Cancelled` if `cancel` fires first.
async fn wait(delay: Option<Duration>, cancel: &CancellationToken) -> Result<(), AgentError> {
    let Some(delay) = delay else {
        return Ok(());
    };
    tokio::select! {
        _ = tokio::time::sleep(delay) => Ok(()),
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
    }
}

pub struct MockAnalyzer {
    name: String,
    fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockAnalyzer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TradeAnalyzer for MockAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(
        &self,
        trade: &Trade,
        cancel: CancellationToken,
    ) -> Result<TradeAnalysis, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        wait(self.delay, &cancel).await?;
        if self.fail {
            return Err(AgentError::Operation(format!("{} unavailable", self.name)));
        }
        Ok(TradeAnalysis {
            summary: format!(
                "{}: {} {} at {}",
                self.name,
                trade.direction.as_str(),
                trade.symbol,
                trade.entry_price
            ),
            confidence: Decimal::new(7, 1),
            risk_level: RiskLevel::Medium,
            recommendations: vec!["Size down until the stop is confirmed".to_string()],
        })
    }
}

pub struct MockTradeStore {
    trade_count: usize,
    fail: bool,
    delay: Option<Duration>,
    trade_calls: AtomicUsize,
    metrics_calls: AtomicUsize,
}

impl MockTradeStore {
    /// A store holding `trade_count` sample trades for every user.
    pub fn new(trade_count: usize) -> Self {
        Self {
            trade_count,
            fail: false,
            delay: None,
            trade_calls: AtomicUsize::new(0),
            metrics_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(0)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn trade_calls(&self) -> usize {
        self.trade_calls.load(Ordering::SeqCst)
    }

    pub fn metrics_calls(&self) -> usize {
        self.metrics_calls.load(Ordering::SeqCst)
    }

    fn trades_for(&self, user_id: &str, limit: Option<u32>) -> Vec<Trade> {
        let count = limit.map_or(self.trade_count, |l| self.trade_count.min(l as usize));
        (0..count)
            .map(|i| {
                let mut trade = sample_trade("AAPL", Decimal::from(100 + i as u64));
                trade.user_id = user_id.to_string();
                trade
            })
            .collect()
    }

    fn check(&self) -> Result<(), AgentError> {
        if self.fail {
            Err(AgentError::Operation("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TradeStore for MockTradeStore {
    async fn fetch_trades(
        &self,
        user_id: &str,
        limit: Option<u32>,
        cancel: CancellationToken,
    ) -> Result<Vec<Trade>, AgentError> {
        self.trade_calls.fetch_add(1, Ordering::SeqCst);
        wait(self.delay, &cancel).await?;
        self.check()?;
        Ok(self.trades_for(user_id, limit))
    }

    async fn fetch_portfolio_metrics(
        &self,
        user_id: &str,
        cancel: CancellationToken,
    ) -> Result<PortfolioSummary, AgentError> {
        self.metrics_calls.fetch_add(1, Ordering::SeqCst);
        wait(self.delay, &cancel).await?;
        self.check()?;
        summarize(&self.trades_for(user_id, None))
    }
}
