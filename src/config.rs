//! Session configuration loaded from JSON.
//!
//! ```json
//! { "arch": "mips", "mode": "MODE_32 | BIG_ENDIAN", "detail": true }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::arch::{Arch, Mode, Syntax};
use crate::session::{Opt, Session};
use crate::Error;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid session config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("engine rejected config: {0}")]
    Engine(#[from] Error),
}

/// Everything needed to open and configure a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    pub arch: Arch,
    /// Mode flags as text; the family default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub detail: bool,
    #[serde(default)]
    pub syntax: Syntax,
}

impl SessionConfig {
    /// Default configuration for `arch`
    pub fn new(arch: Arch) -> Self {
        Self {
            arch,
            mode: None,
            detail: false,
            syntax: Syntax::Default,
        }
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// The configured mode, or the family default
    pub fn mode(&self) -> Mode {
        self.mode.unwrap_or_else(|| self.arch.default_mode())
    }
}

impl Session {
    /// Open a session and apply `config`'s options.
    pub fn from_config(config: &SessionConfig) -> Result<Self, ConfigError> {
        let mut session = Session::open(config.arch, config.mode())?;
        session.set_option(Opt::Detail(config.detail))?;
        if config.syntax != Syntax::Default {
            session.set_option(Opt::Syntax(config.syntax))?;
        }
        Ok(session)
    }
}
