use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user watching a company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub is_premium_tier: bool,
}

impl Subscriber {
    pub fn tier(&self) -> Tier {
        if self.is_premium_tier {
            Tier::Premium
        } else {
            Tier::Free
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Premium,
    Free,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Premium => "premium",
            Tier::Free => "free",
        }
    }
}
