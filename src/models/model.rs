//! Allow-listed model tiers.

use std::fmt::{Display, Formatter};

use tracing::warn;

/// Base model every tier runs on.
pub const BASE_MODEL: &str = "gpt-5";

/// Named reasoning tier accepted for agent runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// Minimal reasoning effort.
    Minimal,
    /// Low reasoning effort.
    Low,
    /// Medium reasoning effort.
    Medium,
    /// High reasoning effort.
    High,
}

impl ModelTier {
    /// Every allow-listed tier.
    pub const ALL: [Self; 4] = [Self::Minimal, Self::Low, Self::Medium, Self::High];

    /// Parse `gpt-5 <tier>` or a bare `<tier>`, case-insensitively.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_ascii_lowercase();
        let effort = lowered
            .strip_prefix(BASE_MODEL)
            .map_or(lowered.as_str(), str::trim_start);
        match effort {
            "minimal" => Some(Self::Minimal),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    /// Parse, logging a warning for values not on the allow-list.
    #[must_use]
    pub fn parse_or_warn(raw: &str) -> Option<Self> {
        let tier = Self::parse(raw);
        if tier.is_none() {
            let allowed = Self::ALL.map(|t| t.to_string()).join(", ");
            warn!(
                model = raw,
                %allowed, "unrecognized model; falling back to the agent default"
            );
        }
        tier
    }

    /// Reasoning effort value passed to the agent.
    #[must_use]
    pub fn effort(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Command-line arguments selecting this tier.
    #[must_use]
    pub fn to_args(self) -> Vec<String> {
        vec![
            "--model".into(),
            BASE_MODEL.into(),
            "-c".into(),
            format!("model_reasoning_effort={}", self.effort()),
        ]
    }
}

impl Display for ModelTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{BASE_MODEL} {}", self.effort())
    }
}
