//! Configuration loading and management

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

/// Default continuation URL base when `BASE_URL` is unset
const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Default retry budget for unanswered prompts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default collect timeout, in seconds
pub const DEFAULT_GATHER_TIMEOUT_SECS: u32 = 10;

/// Number of keypresses requested by every collect instruction
pub const NUM_DIGITS: u32 = 1;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Call-flow tuning
    pub flow: FlowConfig,
}

/// Parameters of the prompt/retry call flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowConfig {
    /// Base URL the provider calls back on, without trailing slash
    pub base_url: String,
    /// Unanswered prompts allowed before the call is ended
    pub max_attempts: u32,
    /// Keypresses to collect per prompt
    pub num_digits: u32,
    /// Seconds the provider waits for a keypress
    pub timeout_secs: u32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            num_digits: NUM_DIGITS,
            timeout_secs: DEFAULT_GATHER_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = match lookup("IVR_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = lookup("HOME").context("HOME is not set")?;
                PathBuf::from(home)
                    .join(".local")
                    .join("share")
                    .join("ivr-callflow")
            }
        };

        let socket_path = lookup("IVR_SOCKET_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("callflow.sock"));

        let base_url = lookup("BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let max_attempts = parse_positive(&lookup, "IVR_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        let timeout_secs = parse_positive(
            &lookup,
            "IVR_GATHER_TIMEOUT_SECS",
            DEFAULT_GATHER_TIMEOUT_SECS,
        )?;

        Ok(Self {
            socket_path,
            data_dir,
            flow: FlowConfig {
                base_url,
                max_attempts,
                num_digits: NUM_DIGITS,
                timeout_secs,
            },
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

fn parse_positive<F>(lookup: &F, key: &str, default: u32) -> Result<u32>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };

    let value: u32 = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a positive integer, got {raw:?}"))?;
    if value == 0 {
        bail!("{key} must be at least 1");
    }
    Ok(value)
}
