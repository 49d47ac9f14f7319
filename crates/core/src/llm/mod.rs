pub mod anthropic;
pub mod error;

use crate::domain::change::Direction;
use crate::domain::snapshot::Snapshot;

/// Everything the narrative needs: both sides of the diff plus the classified move.
#[derive(Debug, Clone)]
pub struct ChangeReportContext {
    pub previous: Snapshot,
    pub current: Snapshot,
    pub previous_score: f64,
    pub current_score: f64,
    pub direction: Direction,
}

impl ChangeReportContext {
    pub fn delta(&self) -> f64 {
        self.current_score - self.previous_score
    }

    /// Compact JSON view of the two snapshots, suitable for embedding in a prompt.
    pub fn snapshots_json(&self) -> serde_json::Value {
        serde_json::json!({
            "previous": snapshot_view(&self.previous),
            "current": snapshot_view(&self.current),
        })
    }
}

fn snapshot_view(s: &Snapshot) -> serde_json::Value {
    serde_json::json!({
        "captured_at": s.captured_at,
        "current_price": s.current_price,
        "overall_score": s.overall_score,
        "breakdown": s.breakdown,
        "strategies": s.strategies,
        "latest_statement": s.latest_statement,
        "sentiment_score": s.sentiment_score,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
        }
    }
}

#[async_trait::async_trait]
pub trait ReportGenerator: Send + Sync {
    fn provider(&self) -> Provider;

    async fn generate_change_report(&self, ctx: &ChangeReportContext) -> anyhow::Result<String>;
}
