//! `[watch]` section configuration.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[watch]` section in quill.toml - incremental rebuild timing.
///
/// # Example
/// ```toml
/// [watch]
/// debounce_ms = 200
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
    /// Quiet period before a batch of events triggers a rebuild.
    #[serde(default = "defaults::watch::debounce_ms")]
    #[educe(Default = defaults::watch::debounce_ms())]
    pub debounce_ms: u64,

    /// Minimum delay between two full rebuilds.
    #[serde(default = "defaults::watch::cooldown_ms")]
    #[educe(Default = defaults::watch::cooldown_ms())]
    pub cooldown_ms: u64,
}
