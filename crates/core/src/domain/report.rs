use crate::domain::change::{ChangeEvent, Direction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SUMMARY_MAX_CHARS: usize = 280;
const SUMMARY_ELLIPSIS: &str = "...";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub id: Uuid,
    pub company_id: i64,
    pub snapshot_id: Uuid,
    pub ticker: String,
    pub previous_score: f64,
    pub current_score: f64,
    pub direction: Direction,
    pub narrative: String,
    pub summary: String,
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewChangeReport {
    pub company_id: i64,
    pub snapshot_id: Uuid,
    pub ticker: String,
    pub previous_score: f64,
    pub current_score: f64,
    pub direction: Direction,
    pub narrative: String,
    pub summary: String,
    pub provider: String,
}

impl NewChangeReport {
    pub fn new(
        company_id: i64,
        snapshot_id: Uuid,
        change: &ChangeEvent,
        narrative: String,
        provider: &str,
    ) -> Self {
        let summary = summarize(&narrative);
        Self {
            company_id,
            snapshot_id,
            ticker: change.ticker.clone(),
            previous_score: change.previous_score,
            current_score: change.current_score,
            direction: change.direction,
            narrative,
            summary,
            provider: provider.to_string(),
        }
    }

    pub fn into_report(self, id: Uuid, created_at: DateTime<Utc>) -> ChangeReport {
        ChangeReport {
            id,
            company_id: self.company_id,
            snapshot_id: self.snapshot_id,
            ticker: self.ticker,
            previous_score: self.previous_score,
            current_score: self.current_score,
            direction: self.direction,
            narrative: self.narrative,
            summary: self.summary,
            provider: self.provider,
            created_at,
        }
    }
}

/// Cuts the narrative at a raw character count. Markup is not respected, so a summary can end
/// inside a tag or a markdown construct; consumers already depend on this exact shape.
pub fn summarize(narrative: &str) -> String {
    let trimmed = narrative.trim();
    if trimmed.chars().count() <= SUMMARY_MAX_CHARS {
        return trimmed.to_string();
    }

    let mut out: String = trimmed.chars().take(SUMMARY_MAX_CHARS).collect();
    out.push_str(SUMMARY_ELLIPSIS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_narrative_is_kept_whole() {
        assert_eq!(summarize("  Score rose on margin expansion.  "), "Score rose on margin expansion.");
    }

    #[test]
    fn long_narrative_is_cut_at_char_count() {
        let narrative = "a".repeat(SUMMARY_MAX_CHARS + 50);
        let summary = summarize(&narrative);
        assert_eq!(summary.chars().count(), SUMMARY_MAX_CHARS + SUMMARY_ELLIPSIS.len());
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn truncation_can_split_markup() {
        let mut narrative = "x".repeat(SUMMARY_MAX_CHARS - 3);
        narrative.push_str("<strong>upgrade</strong>");
        let summary = summarize(&narrative);
        assert!(summary.ends_with("<st..."));
    }

    #[test]
    fn multibyte_text_is_counted_in_chars() {
        let narrative = "é".repeat(SUMMARY_MAX_CHARS + 1);
        let summary = summarize(&narrative);
        assert_eq!(summary.chars().filter(|c| *c == 'é').count(), SUMMARY_MAX_CHARS);
    }

    #[test]
    fn new_report_copies_change_and_summarizes() {
        let change = ChangeEvent {
            ticker: "ACME".to_string(),
            previous_score: 60.0,
            current_score: 66.0,
            delta: 6.0,
            direction: Direction::Positive,
        };
        let report = NewChangeReport::new(3, Uuid::nil(), &change, "Narrative".to_string(), "anthropic");
        assert_eq!(report.previous_score, 60.0);
        assert_eq!(report.current_score, 66.0);
        assert_eq!(report.direction, Direction::Positive);
        assert_eq!(report.summary, "Narrative");
        assert_eq!(report.provider, "anthropic");
    }
}
