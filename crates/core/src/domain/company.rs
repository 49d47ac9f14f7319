use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tracked company. `last_checked_at` only drives round-robin selection; it says nothing
/// about whether the last examination succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub ticker: String,
    pub name: String,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
}
