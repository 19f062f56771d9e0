//! Policy configuration.

use crate::error::{PolicyError, Result};
use serde::{Deserialize, Serialize};
use warden_votes::VoteKind;

pub const DEFAULT_GOOD_BOT_THRESHOLD: u64 = 2;
pub const DEFAULT_BAD_BOT_THRESHOLD: u64 = 2;
pub const DEFAULT_OVERRIDE_LABEL: &str = "bladerunner";
pub const DEFAULT_DISQUALIFYING_LABELS: [&str; 2] = ["jabroni", "bad-bot"];

/// Thresholds and special labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotVoteConfig {
    pub good_bot_threshold: u64,
    pub bad_bot_threshold: u64,
    /// Voters carrying any of these are ignored.
    pub disqualifying_labels: Vec<String>,
    /// Voters carrying this label apply labels immediately.
    pub override_label: String,
}

impl Default for BotVoteConfig {
    fn default() -> Self {
        Self {
            good_bot_threshold: DEFAULT_GOOD_BOT_THRESHOLD,
            bad_bot_threshold: DEFAULT_BAD_BOT_THRESHOLD,
            disqualifying_labels: DEFAULT_DISQUALIFYING_LABELS.iter().map(|s| s.to_string()).collect(),
            override_label: DEFAULT_OVERRIDE_LABEL.to_string(),
        }
    }
}

impl BotVoteConfig {
    pub fn threshold(&self, kind: VoteKind) -> u64 {
        match kind {
            VoteKind::GoodBot => self.good_bot_threshold,
            VoteKind::BadBot => self.bad_bot_threshold,
        }
    }

    #[must_use]
    pub fn with_thresholds(mut self, good_bot: u64, bad_bot: u64) -> Self {
        self.good_bot_threshold = good_bot;
        self.bad_bot_threshold = bad_bot;
        self
    }

    pub fn validate(&self) -> Result<()> {
        for kind in VoteKind::ALL {
            if self.threshold(kind) == 0 {
                return Err(PolicyError::InvalidConfig(format!("{} threshold must be at least 1", kind)));
            }
        }
        if self.override_label.trim().is_empty() {
            return Err(PolicyError::InvalidConfig("override label is empty".to_string()));
        }
        if self.disqualifying_labels.iter().any(|l| l.trim().is_empty()) {
            return Err(PolicyError::InvalidConfig("disqualifying labels contain an empty entry".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = BotVoteConfig::default();
        config.validate().unwrap();
        assert_eq!(config.threshold(VoteKind::GoodBot), 2);
        assert_eq!(config.threshold(VoteKind::BadBot), 2);
        assert_eq!(config.override_label, "bladerunner");
        assert_eq!(config.disqualifying_labels, vec!["jabroni", "bad-bot"]);
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let config = BotVoteConfig::default().with_thresholds(0, 2);
        assert!(matches!(config.validate(), Err(PolicyError::InvalidConfig(_))));
    }

    #[test]
    fn empty_override_is_rejected() {
        let config = BotVoteConfig {
            override_label: " ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
