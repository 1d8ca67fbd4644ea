//! Policy configuration
//!
//! Loaded once at startup from environment variables or built with defaults.
//! Every ceiling and confirmation decision flows through here.

use serde::{Deserialize, Serialize};

/// Step ceilings and confirmation policy for plan execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfig {
    /// Flattened step ceiling, branch bodies included.
    pub max_steps: usize,
    /// Ceiling on steps whose skeleton writes task data.
    pub max_write_steps: usize,
    /// Destructive skeletons must sit inside a confirm branch.
    pub require_confirm_for_destructive: bool,
    /// Wrap unconfirmed destructive steps instead of rejecting the plan.
    pub auto_inject_confirm: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_steps: 8,
            max_write_steps: 4,
            require_confirm_for_destructive: true,
            auto_inject_confirm: true,
        }
    }
}

impl PolicyConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_steps: env_usize("TASKPLAN_MAX_STEPS", defaults.max_steps),
            max_write_steps: env_usize("TASKPLAN_MAX_WRITE_STEPS", defaults.max_write_steps),
            require_confirm_for_destructive: env_bool(
                "TASKPLAN_REQUIRE_CONFIRM_FOR_DESTRUCTIVE",
                defaults.require_confirm_for_destructive,
            ),
            auto_inject_confirm: env_bool(
                "TASKPLAN_AUTO_INJECT_CONFIRM",
                defaults.auto_inject_confirm,
            ),
        }
    }

    /// Policy that blocks instead of normalizing destructive plans.
    pub fn strict() -> Self {
        Self {
            auto_inject_confirm: false,
            ..Self::default()
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"),
        Err(_) => default,
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PolicyConfig::default();
        assert_eq!(config.max_steps, 8);
        assert_eq!(config.max_write_steps, 4);
        assert!(config.require_confirm_for_destructive);
        assert!(config.auto_inject_confirm);
    }

    #[test]
    fn test_strict_blocks_instead_of_normalizing() {
        let config = PolicyConfig::strict();
        assert!(config.require_confirm_for_destructive);
        assert!(!config.auto_inject_confirm);
    }
}
