use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Setting key holding the GitHub owner used for bare repository targets.
pub const GITHUB_DEFAULT_OWNER: &str = "github.default_owner";

/// A user default stored alongside the project registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}
