//! Configuration options for scripts and the embedded server.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options fixed when a [`Script`](crate::Script) is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptOptions {
    /// Invoke the script with the read-only verb family (`EVAL_RO`/`EVALSHA_RO`).
    /// Default: false
    pub read_only: bool,

    /// Try the identity first (`EVALSHA`) and only send the body on a cache miss.
    /// When false every call carries the full body.
    /// Default: true
    pub hash_caching: bool,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self { read_only: false, hash_caching: true }
    }
}

/// Configuration options for a [`LocalServer`](crate::server::LocalServer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    /// Maximum wall time a single script may run.
    /// None disables the limit.
    /// Default: 5s
    pub script_timeout: Option<Duration>,

    /// Maximum number of bodies kept in the script cache.
    /// The oldest entry is evicted when full. 0 means unbounded.
    /// Default: 1024
    pub max_cached_scripts: usize,

    /// Number of Lua VM instructions between timeout checks.
    /// Default: 1000
    pub instruction_hook_interval: u32,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            script_timeout: Some(Duration::from_secs(5)),
            max_cached_scripts: 1024,
            instruction_hook_interval: 1000,
        }
    }
}

impl ServerOptions {
    /// Parses options from a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: ServerOptions = serde_json::from_str(json)
            .map_err(|e| Error::invalid_argument(format!("server options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Validates the configuration options.
    pub fn validate(&self) -> Result<()> {
        if self.instruction_hook_interval == 0 {
            return Err(Error::invalid_argument("instruction_hook_interval must be > 0"));
        }
        if self.script_timeout == Some(Duration::ZERO) {
            return Err(Error::invalid_argument("script_timeout must be > 0 when set"));
        }
        Ok(())
    }
}
