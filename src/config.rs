use crate::error::{Result, VastError};
use crate::processing::TimeoutKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Limits applied while resolving an ad pod
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(default)]
pub struct ResolverConfig {
    /// Maximum depth of the wrapper chain, counting the next target
    pub max_redirect_count: usize,

    /// After this, pending items are dropped once a pod member has an ad
    pub soft_timeout_ms: u64,

    /// After this, every unfinished pod member times out
    pub hard_timeout_ms: u64,

    /// After this, the ad search stops altogether. Every pod member is
    /// already finished by the hard timeout, so this only takes effect when
    /// it equals `hard_timeout_ms`.
    pub max_ad_search_timeout_ms: u64,

    /// Timeout for a single document fetch
    pub request_timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_redirect_count: 3,
            soft_timeout_ms: 1500,
            hard_timeout_ms: 3500,
            max_ad_search_timeout_ms: 9000,
            request_timeout_ms: 3000,
        }
    }
}

impl ResolverConfig {
    /// Load a config from a JSON object; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        if !value.is_object() {
            return Err(VastError::InvalidConfig("config must be a JSON object".to_string()));
        }
        let config: ResolverConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_redirect_count == 0 {
            return Err(VastError::InvalidConfig("max_redirect_count must be positive".to_string()));
        }
        if self.soft_timeout_ms > self.hard_timeout_ms || self.hard_timeout_ms > self.max_ad_search_timeout_ms {
            return Err(VastError::InvalidConfig(
                "timeouts must satisfy soft <= hard <= max ad search".to_string(),
            ));
        }
        Ok(())
    }

    pub fn soft_timeout(&self) -> Duration {
        Duration::from_millis(self.soft_timeout_ms)
    }

    pub fn hard_timeout(&self) -> Duration {
        Duration::from_millis(self.hard_timeout_ms)
    }

    pub fn max_ad_search_timeout(&self) -> Duration {
        Duration::from_millis(self.max_ad_search_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Classify time spent on the current pod
    pub fn timeout_kind(&self, elapsed: Duration) -> TimeoutKind {
        if elapsed >= self.hard_timeout() {
            TimeoutKind::Hard
        } else if elapsed >= self.soft_timeout() {
            TimeoutKind::Soft
        } else {
            TimeoutKind::None
        }
    }

    pub fn deadline_reached(&self, elapsed: Duration) -> bool {
        elapsed >= self.max_ad_search_timeout()
    }

    /// The next timeout boundary after `elapsed`
    pub fn next_boundary(&self, elapsed: Duration) -> Duration {
        [self.soft_timeout(), self.hard_timeout(), self.max_ad_search_timeout()]
            .into_iter()
            .find(|boundary| *boundary > elapsed)
            .unwrap_or_else(|| self.max_ad_search_timeout())
    }
}
