//! Scheduler configuration.
//!
//! Loaded via the `config` crate from `REPUBLISH_`-prefixed environment
//! variables, e.g. `REPUBLISH_DEFAULT_REPUBLISH_POLICY=restart_on_publish`.

use crate::schedule::RepublishPolicy;
use serde::Deserialize;

/// Settings for evaluation passes.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Policy for campaigns that do not set their own.
    #[serde(default)]
    pub default_republish_policy: RepublishPolicy,

    /// Maximum number of campaigns loaded at once during a pass.
    #[serde(default = "default_campaign_concurrency")]
    pub campaign_concurrency: usize,
}

fn default_campaign_concurrency() -> usize {
    8
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_republish_policy: RepublishPolicy::default(),
            campaign_concurrency: default_campaign_concurrency(),
        }
    }
}

impl SchedulerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("REPUBLISH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Campaign concurrency, never below one.
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        self.campaign_concurrency.max(1)
    }
}
