use crate::config::Settings;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{ChangeReportContext, Provider, ReportGenerator};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = std::env::var("ANTHROPIC_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let timeout_secs = std::env::var("ANTHROPIC_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_tokens,
        })
    }

    async fn create_message(
        &self,
        req: CreateMessageRequest,
    ) -> anyhow::Result<(serde_json::Value, CreateMessageResponse)> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Anthropic response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            return Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "http",
                detail: format!("status={status}"),
                raw_output: Some(text),
                raw_response_json,
            }
            .into());
        }

        let raw_json = serde_json::from_str::<serde_json::Value>(&text)
            .with_context(|| format!("failed to parse Anthropic response JSON: {text}"))?;
        let parsed = serde_json::from_value::<CreateMessageResponse>(raw_json.clone())
            .context("failed to decode Anthropic response into CreateMessageResponse")?;
        Ok((raw_json, parsed))
    }

    fn system_prompt() -> String {
        [
            "You are an equity analyst writing short change notes for retail investors.",
            "Explain why a company's fundamental score moved between two snapshots.",
            "Ground every statement in the numbers provided; do not invent data.",
            "Write 2-4 short paragraphs of plain prose. No headings, no bullet lists.",
            "Start with the single most important driver of the move.",
            "Never give buy or sell advice.",
        ]
        .join("\n")
    }

    fn user_prompt(ctx: &ChangeReportContext) -> String {
        format!(
            "Company: {} ({})\nSector: {}\nScore moved {} from {:.2} to {:.2} (delta {:+.2}).\n\nSnapshots JSON:\n{}",
            ctx.current.name,
            ctx.current.ticker,
            ctx.current.sector.as_deref().unwrap_or("unknown"),
            ctx.direction,
            ctx.previous_score,
            ctx.current_score,
            ctx.delta(),
            ctx.snapshots_json()
        )
    }

    fn response_text(res: &CreateMessageResponse) -> String {
        let mut out = String::new();
        for block in &res.content {
            match block {
                ContentBlock::Text { text } => {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(text);
                }
                ContentBlock::Thinking {} | ContentBlock::RedactedThinking {} => {
                    // Ignore.
                }
                ContentBlock::Unknown => {
                    // Ignore unknown blocks.
                }
            }
        }
        out
    }
}

#[async_trait::async_trait]
impl ReportGenerator for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn generate_change_report(&self, ctx: &ChangeReportContext) -> anyhow::Result<String> {
        let make_req = |max_tokens: u32| CreateMessageRequest {
            model: self.model.clone(),
            max_tokens,
            system: Some(Self::system_prompt()),
            messages: vec![Message {
                role: "user",
                content: Self::user_prompt(ctx),
            }],
        };

        let (mut raw_json, mut res) = self.create_message(make_req(self.max_tokens)).await?;

        // A truncated narrative is worse than none; retry once with a higher ceiling.
        if matches!(res.stop_reason.as_deref(), Some("max_tokens")) {
            let bumped = self.max_tokens.saturating_mul(2).max(2048);
            tracing::warn!(
                ticker = %ctx.current.ticker,
                from = self.max_tokens,
                to = bumped,
                "Anthropic stop_reason=max_tokens; retrying once with higher max_tokens"
            );
            let (rj, r) = self.create_message(make_req(bumped)).await?;
            raw_json = rj;
            res = r;
        }

        let text = Self::response_text(&res);
        let narrative = text.trim();
        if narrative.is_empty() {
            return Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "empty",
                detail: format!("no text content (stop_reason={:?})", res.stop_reason),
                raw_output: Some(text),
                raw_response_json: Some(raw_json),
            }
            .into());
        }

        Ok(narrative.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,

    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "thinking")]
    Thinking {},

    #[serde(rename = "redacted_thinking")]
    RedactedThinking {},

    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::change::Direction;
    use crate::domain::snapshot::Snapshot;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn snapshot(score: f64) -> Snapshot {
        Snapshot {
            id: Uuid::new_v4(),
            company_id: 1,
            ticker: "ACME".to_string(),
            name: "Acme Corp".to_string(),
            sector: Some("Industrials".to_string()),
            current_price: Some(10.0),
            overall_score: score,
            breakdown: BTreeMap::from([("graham".to_string(), score)]),
            strategies: json!({}),
            latest_statement: None,
            sentiment_score: None,
            captured_at: Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn joins_text_blocks_and_skips_others() {
        let res: CreateMessageResponse = serde_json::from_value(json!({
            "content": [
                {"type": "thinking", "thinking": "hmm", "signature": "s"},
                {"type": "redacted_thinking", "data": "opaque"},
                {"type": "text", "text": "First."},
                {"type": "server_tool_use", "id": "x"},
                {"type": "text", "text": "Second."}
            ],
            "stop_reason": "end_turn"
        }))
        .unwrap();

        assert_eq!(AnthropicClient::response_text(&res), "First.\nSecond.");
        assert_eq!(res.stop_reason.as_deref(), Some("end_turn"));
    }

    #[test]
    fn user_prompt_carries_scores_and_direction() {
        let ctx = ChangeReportContext {
            previous: snapshot(60.0),
            current: snapshot(65.0),
            previous_score: 60.0,
            current_score: 65.0,
            direction: Direction::Positive,
        };

        let prompt = AnthropicClient::user_prompt(&ctx);
        assert!(prompt.contains("Acme Corp (ACME)"));
        assert!(prompt.contains("moved positive from 60.00 to 65.00 (delta +5.00)"));
        assert!(prompt.contains("\"previous\""));
    }
}
