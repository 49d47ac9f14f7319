pub mod http;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreOptions {
    pub include_strategies: bool,
    pub include_statements: bool,
}

impl ScoreOptions {
    /// Everything a snapshot stores.
    pub fn full() -> Self {
        Self {
            include_strategies: true,
            include_statements: true,
        }
    }
}

/// Overall fundamental score plus the strategy outputs it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub overall_score: f64,
    #[serde(default)]
    pub breakdown: BTreeMap<String, f64>,
    #[serde(default)]
    pub strategies: Value,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub latest_statement: Option<Value>,
    #[serde(default)]
    pub sentiment_score: Option<f64>,
}

#[async_trait::async_trait]
pub trait ScoreProvider: Send + Sync {
    /// `Ok(None)` means the company lacks the data needed for a score. That is an expected
    /// outcome, not a failure.
    async fn compute_overall_score(
        &self,
        ticker: &str,
        options: ScoreOptions,
    ) -> anyhow::Result<Option<ScoreResult>>;
}
