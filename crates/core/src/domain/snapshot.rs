use crate::domain::company::Company;
use crate::score::ScoreResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Immutable point-in-time capture of a company's fundamentals and score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub company_id: i64,
    pub ticker: String,
    pub name: String,
    pub sector: Option<String>,
    pub current_price: Option<f64>,
    pub overall_score: f64,
    pub breakdown: BTreeMap<String, f64>,
    pub strategies: Value,
    pub latest_statement: Option<Value>,
    pub sentiment_score: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

/// Snapshot payload before it has been assigned an id and capture instant by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSnapshot {
    pub ticker: String,
    pub name: String,
    pub sector: Option<String>,
    pub current_price: Option<f64>,
    pub overall_score: f64,
    pub breakdown: BTreeMap<String, f64>,
    pub strategies: Value,
    pub latest_statement: Option<Value>,
    pub sentiment_score: Option<f64>,
}

impl NewSnapshot {
    pub fn from_score(company: &Company, score: &ScoreResult) -> Self {
        Self {
            ticker: company.ticker.clone(),
            name: company.name.clone(),
            sector: company.sector.clone(),
            current_price: score.current_price,
            overall_score: score.overall_score,
            breakdown: score.breakdown.clone(),
            strategies: score.strategies.clone(),
            latest_statement: score.latest_statement.clone(),
            sentiment_score: score.sentiment_score,
        }
    }

    pub fn into_snapshot(self, id: Uuid, company_id: i64, captured_at: DateTime<Utc>) -> Snapshot {
        Snapshot {
            id,
            company_id,
            ticker: self.ticker,
            name: self.name,
            sector: self.sector,
            current_price: self.current_price,
            overall_score: self.overall_score,
            breakdown: self.breakdown,
            strategies: self.strategies,
            latest_statement: self.latest_statement,
            sentiment_score: self.sentiment_score,
            captured_at,
        }
    }
}

/// Numeric entries of a JSON object; anything else is dropped.
pub fn json_to_breakdown(v: Value) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    let obj = match v {
        Value::Object(o) => o,
        _ => return out,
    };

    for (k, val) in obj {
        if let Some(n) = val.as_f64() {
            out.insert(k, n);
        }
    }

    out
}
