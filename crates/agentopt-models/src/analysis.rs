use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Analysis of a single trade produced by a language model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeAnalysis {
    pub summary: String,
    /// 0.0 to 1.0.
    pub confidence: Decimal,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
}
