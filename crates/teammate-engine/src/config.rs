use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};

pub const DEFAULT_DIRECT_THRESHOLD: f64 = 90.0;
pub const DEFAULT_SOFT_THRESHOLD: f64 = 50.0;
pub const DEFAULT_MAX_HISTORY_CHARS: usize = 8192;
pub const DEFAULT_PRUNE_CAP: usize = 10;

/// Operator-tunable knobs of the engine. Read once at startup and passed down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Scores above this get a threaded reply to the triggering message.
    pub direct_threshold: f64,
    /// Scores above this (but not above `direct_threshold`) get a plain chat message.
    pub soft_threshold: f64,
    /// Character budget of the transcript handed to the model.
    pub max_history_chars: usize,
    /// Most messages deleted by a single history build.
    pub prune_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            direct_threshold: DEFAULT_DIRECT_THRESHOLD,
            soft_threshold: DEFAULT_SOFT_THRESHOLD,
            max_history_chars: DEFAULT_MAX_HISTORY_CHARS,
            prune_cap: DEFAULT_PRUNE_CAP,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.soft_threshold.is_finite() || !self.direct_threshold.is_finite() {
            bail!("reply thresholds must be finite numbers");
        }
        if self.soft_threshold >= self.direct_threshold {
            bail!(
                "soft threshold ({}) must be below direct threshold ({})",
                self.soft_threshold,
                self.direct_threshold
            );
        }
        if self.max_history_chars == 0 {
            bail!("history budget must be positive");
        }
        Ok(())
    }
}

/// Which answer format the model is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseContract {
    /// JSON object with message, type, score and note edits.
    #[default]
    Structured,
    /// Free text: a header line (or `SKIP`), then the message.
    Legacy,
}

impl ResponseContract {
    /// Whether the model should be constrained to JSON output.
    pub fn wants_json(self) -> bool {
        self == Self::Structured
    }
}

impl FromStr for ResponseContract {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "structured" | "json" => Ok(Self::Structured),
            "legacy" | "text" => Ok(Self::Legacy),
            other => bail!("unknown response contract '{}'", other),
        }
    }
}

impl fmt::Display for ResponseContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured => f.write_str("structured"),
            Self::Legacy => f.write_str("legacy"),
        }
    }
}
