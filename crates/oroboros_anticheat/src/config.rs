//! # Anti-Cheat Configuration
//!
//! Loaded once at startup from TOML. Every table and key is optional; a
//! missing key keeps the built-in default for that check.
//!
//! ```toml
//! [pipeline]
//! async_checks = true
//!
//! [checks.inertia]
//! punish_threshold = 8.0
//! decay = { multiplicative = 0.99 }
//!
//! [checks.convergence]
//! enabled = false
//! ```

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How a violation level recovers on a passing evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decay {
    /// Subtract a fixed amount, floored at zero.
    Linear(f64),
    /// Multiply by a factor in `[0, 1]`.
    Multiplicative(f64),
}

impl Decay {
    /// Applies one step of decay to a level.
    #[must_use]
    pub fn apply(self, level: f64) -> f64 {
        match self {
            Self::Linear(amount) => (level - amount).max(0.0),
            Self::Multiplicative(factor) => (level * factor).max(0.0),
        }
    }
}

/// Rate limit on punishment callbacks for one player and one check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagLimit {
    /// Callbacks allowed per window.
    pub max_flags: u32,
    /// Rolling window length in milliseconds.
    pub window_ms: u64,
}

/// Immutable configuration of one check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Check name, used in punishments and logs.
    pub name: String,
    /// Disabled checks are never evaluated.
    pub enabled: bool,
    /// Recovery on pass.
    pub decay: Decay,
    /// Level at which the punishment callback fires.
    pub punish_threshold: f64,
    /// Level at which a requested resync is honored. `None` means always.
    pub resync_threshold: Option<f64>,
    /// Hard ceiling for the violation level.
    pub violation_cap: f64,
    /// Optional rate limit on callbacks. `None` means unbounded.
    pub flag_limit: Option<FlagLimit>,
    /// Template with `%player%` and `%vl%` placeholders.
    pub message: String,
}

impl CheckConfig {
    /// Built-in configuration for the inertia check.
    #[must_use]
    pub fn inertia() -> Self {
        Self {
            name: "inertia".to_string(),
            enabled: true,
            decay: Decay::Multiplicative(0.995),
            punish_threshold: 5.0,
            resync_threshold: None,
            violation_cap: 100.0,
            flag_limit: Some(FlagLimit { max_flags: 1, window_ms: 5000 }),
            message: "%player% failed inertia, VL: %vl%".to_string(),
        }
    }

    /// Built-in configuration for the aim convergence check.
    #[must_use]
    pub fn convergence() -> Self {
        Self {
            name: "aimbotconvergence".to_string(),
            enabled: true,
            decay: Decay::Multiplicative(0.999),
            punish_threshold: 1.0,
            resync_threshold: None,
            violation_cap: 100.0,
            flag_limit: Some(FlagLimit { max_flags: 1, window_ms: 5000 }),
            message: "%player% is using aimbot (convergence), VL: %vl%".to_string(),
        }
    }

    /// Renders the message template for a player at a level.
    #[must_use]
    pub fn format_message(&self, player: &str, level: f64) -> String {
        self.message
            .replace("%player%", player)
            .replace("%vl%", &format!("{}", level.round()))
    }

    /// Checks that every value is in range.
    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |what: &str| -> ConfigResult<()> {
            Err(ConfigError::Invalid(format!("check {:?}: {what}", self.name)))
        };

        if self.name.is_empty() {
            return Err(ConfigError::Invalid("check name must not be empty".to_string()));
        }
        if !(self.violation_cap > 0.0) {
            return invalid("violation_cap must be positive");
        }
        if !(self.punish_threshold > 0.0) || self.punish_threshold > self.violation_cap {
            return invalid("punish_threshold must be in (0, violation_cap]");
        }
        if let Some(resync) = self.resync_threshold {
            if !(resync >= 0.0) {
                return invalid("resync_threshold must be non-negative");
            }
        }
        match self.decay {
            Decay::Linear(amount) if !(amount >= 0.0) => {
                return invalid("linear decay must be non-negative");
            }
            Decay::Multiplicative(factor) if !(0.0..=1.0).contains(&factor) => {
                return invalid("multiplicative decay must be in [0, 1]");
            }
            _ => {}
        }
        if let Some(limit) = self.flag_limit {
            if limit.max_flags == 0 || limit.window_ms == 0 {
                return invalid("flag_limit needs max_flags > 0 and window_ms > 0");
            }
        }
        Ok(())
    }
}

/// Partial override of a [`CheckConfig`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckOverrides {
    /// See [`CheckConfig::name`].
    pub name: Option<String>,
    /// See [`CheckConfig::enabled`].
    pub enabled: Option<bool>,
    /// See [`CheckConfig::decay`].
    pub decay: Option<Decay>,
    /// See [`CheckConfig::punish_threshold`].
    pub punish_threshold: Option<f64>,
    /// See [`CheckConfig::resync_threshold`].
    pub resync_threshold: Option<f64>,
    /// See [`CheckConfig::violation_cap`].
    pub violation_cap: Option<f64>,
    /// See [`CheckConfig::flag_limit`].
    pub flag_limit: Option<FlagLimit>,
    /// Disables the flag limit when true.
    pub unlimited_flags: Option<bool>,
    /// See [`CheckConfig::message`].
    pub message: Option<String>,
}

impl CheckOverrides {
    /// Applies these overrides on top of `base`.
    #[must_use]
    pub fn apply(&self, mut base: CheckConfig) -> CheckConfig {
        if let Some(name) = &self.name {
            base.name.clone_from(name);
        }
        if let Some(enabled) = self.enabled {
            base.enabled = enabled;
        }
        if let Some(decay) = self.decay {
            base.decay = decay;
        }
        if let Some(threshold) = self.punish_threshold {
            base.punish_threshold = threshold;
        }
        if let Some(threshold) = self.resync_threshold {
            base.resync_threshold = Some(threshold);
        }
        if let Some(cap) = self.violation_cap {
            base.violation_cap = cap;
        }
        if let Some(limit) = self.flag_limit {
            base.flag_limit = Some(limit);
        }
        if self.unlimited_flags == Some(true) {
            base.flag_limit = None;
        }
        if let Some(message) = &self.message {
            base.message.clone_from(message);
        }
        base
    }
}

/// Packet pipeline settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Analyze on a dedicated worker instead of the caller thread.
    pub async_checks: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { async_checks: true }
    }
}

/// Per-check overrides for the built-in catalog.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChecksConfig {
    /// Overrides for the inertia check.
    pub inertia: CheckOverrides,
    /// Overrides for the aim convergence check.
    pub convergence: CheckOverrides,
}

impl ChecksConfig {
    /// Resolved inertia configuration.
    #[must_use]
    pub fn inertia(&self) -> CheckConfig {
        self.inertia.apply(CheckConfig::inertia())
    }

    /// Resolved convergence configuration.
    #[must_use]
    pub fn convergence(&self) -> CheckConfig {
        self.convergence.apply(CheckConfig::convergence())
    }
}

/// Top-level anti-cheat configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AntiCheatConfig {
    /// Pipeline settings.
    pub pipeline: PipelineConfig,
    /// Check settings.
    pub checks: ChecksConfig,
}

impl AntiCheatConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Validates every resolved check.
    pub fn validate(&self) -> ConfigResult<()> {
        self.checks.inertia().validate()?;
        self.checks.convergence().validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AntiCheatConfig::from_toml_str("").unwrap();
        assert!(config.pipeline.async_checks);
        assert_eq!(config.checks.inertia(), CheckConfig::inertia());
        assert_eq!(config.checks.convergence(), CheckConfig::convergence());
    }

    #[test]
    fn test_partial_override_keeps_other_defaults() {
        let config = AntiCheatConfig::from_toml_str(
            r#"
            [pipeline]
            async_checks = false

            [checks.inertia]
            punish_threshold = 8.0
            decay = { linear = 0.5 }

            [checks.convergence]
            enabled = false
            unlimited_flags = true
            "#,
        )
        .unwrap();

        assert!(!config.pipeline.async_checks);

        let inertia = config.checks.inertia();
        assert_eq!(inertia.punish_threshold, 8.0);
        assert_eq!(inertia.decay, Decay::Linear(0.5));
        assert_eq!(inertia.message, CheckConfig::inertia().message);

        let convergence = config.checks.convergence();
        assert!(!convergence.enabled);
        assert!(convergence.flag_limit.is_none());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = AntiCheatConfig::from_toml_str("[checks.inertia]\nviolation_cap = -1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = AntiCheatConfig::from_toml_str("[checks.convergence]\ndecay = { multiplicative = 1.5 }\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = AntiCheatConfig::from_toml_str("[checks.inertia]\nflag_limit = { max_flags = 0, window_ms = 10 }\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_unknown_keys_are_parse_errors() {
        let err = AntiCheatConfig::from_toml_str("[pipeline]\nasync = true\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_decay_never_goes_negative() {
        assert_eq!(Decay::Linear(2.0).apply(1.5), 0.0);
        assert_eq!(Decay::Multiplicative(0.5).apply(3.0), 1.5);
        assert_eq!(Decay::Multiplicative(0.0).apply(3.0), 0.0);
    }

    #[test]
    fn test_message_placeholders() {
        let config = CheckConfig::inertia();
        assert_eq!(config.format_message("steve", 5.4), "steve failed inertia, VL: 5");
    }
}
