pub mod domain;
pub mod llm;
pub mod monitor;
pub mod notify;
pub mod score;
pub mod storage;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub score_provider_base_url: Option<String>,
        pub score_provider_api_key: Option<String>,
        pub cron_secret: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: non_empty_var("DATABASE_URL"),
                anthropic_api_key: non_empty_var("ANTHROPIC_API_KEY"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                score_provider_base_url: non_empty_var("SCORE_PROVIDER_BASE_URL"),
                score_provider_api_key: non_empty_var("SCORE_PROVIDER_API_KEY"),
                cron_secret: non_empty_var("CRON_SECRET"),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }

        pub fn require_score_provider_base_url(&self) -> anyhow::Result<&str> {
            self.score_provider_base_url
                .as_deref()
                .context("SCORE_PROVIDER_BASE_URL is required")
        }
    }

    // An exported-but-empty variable is treated the same as a missing one.
    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}
