use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_SESSION_COMMAND: &str = "claude";

/// The interactive CLI each worker wraps.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Grace period between SIGTERM and SIGKILL when terminating a session.
    pub terminate_grace_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_SESSION_COMMAND.to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
            terminate_grace_ms: 2000,
        }
    }
}
