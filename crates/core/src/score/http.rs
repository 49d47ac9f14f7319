use crate::config::Settings;
use crate::score::{ScoreOptions, ScoreProvider, ScoreResult};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct HttpScoreProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    retries: u32,
}

/// Wire shape of the scoring service. `score` is null when the company has insufficient data.
#[derive(Debug, Clone, Deserialize)]
struct ScoreResponse {
    #[serde(default)]
    score: Option<ScoreResult>,
}

enum FetchError {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

impl HttpScoreProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_score_provider_base_url()?.to_string();
        let api_key = settings.score_provider_api_key.clone();

        let timeout_secs = std::env::var("SCORE_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("SCORE_PROVIDER_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .max(1);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build score provider http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            retries,
        })
    }

    fn url(&self, ticker: &str) -> String {
        format!(
            "{}/v1/scores/{}",
            self.base_url.trim_end_matches('/'),
            ticker.trim()
        )
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn fetch_once(
        &self,
        ticker: &str,
        options: ScoreOptions,
    ) -> std::result::Result<Option<ScoreResult>, FetchError> {
        let headers = self.headers().map_err(FetchError::Fatal)?;

        let res = self
            .http
            .get(self.url(ticker))
            .headers(headers)
            .query(&[
                ("include_strategies", options.include_strategies.to_string()),
                ("include_statements", options.include_statements.to_string()),
            ])
            .send()
            .await
            .context("score provider request failed")
            .map_err(FetchError::Retryable)?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read score provider response")
            .map_err(FetchError::Retryable)?;

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let err = anyhow::anyhow!("score provider HTTP {status}: {text}");
            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            return Err(if retryable {
                FetchError::Retryable(err)
            } else {
                FetchError::Fatal(err)
            });
        }

        parse_score_response(&text).map_err(FetchError::Fatal)
    }
}

#[async_trait::async_trait]
impl ScoreProvider for HttpScoreProvider {
    async fn compute_overall_score(
        &self,
        ticker: &str,
        options: ScoreOptions,
    ) -> Result<Option<ScoreResult>> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(ticker, options).await {
                Ok(score) => return Ok(score),
                Err(FetchError::Fatal(err)) => return Err(err),
                Err(FetchError::Retryable(err)) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(attempt, ?backoff, %ticker, error = %err, "score provider fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

fn parse_score_response(text: &str) -> Result<Option<ScoreResult>> {
    let parsed = serde_json::from_str::<ScoreResponse>(text)
        .with_context(|| format!("score provider response is not valid JSON: {text}"))?;

    let Some(score) = parsed.score else {
        return Ok(None);
    };
    validate_score(&score)?;
    Ok(Some(score))
}

fn validate_score(score: &ScoreResult) -> Result<()> {
    anyhow::ensure!(
        score.overall_score.is_finite(),
        "overall_score must be finite (got {})",
        score.overall_score
    );
    if let Some(price) = score.current_price {
        anyhow::ensure!(price.is_finite(), "current_price must be finite");
    }
    Ok(())
}
