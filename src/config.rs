//! Mapper configuration.
//!
//! Every field has a default, so a partial document deserializes:
//!
//! ```
//! use sqlx_named_mapper::config::{MapperConfig, PlaceholderStyle};
//!
//! let config: MapperConfig = serde_json::from_str(r#"{ "placeholder": "numbered" }"#)?;
//! assert_eq!(config.placeholder, Some(PlaceholderStyle::Numbered));
//! assert_eq!(config.cache.threshold_secs, 2);
//! # Ok::<(), serde_json::Error>(())
//! ```

use std::time::Duration;

use serde::Deserialize;

pub use crate::builder::PlaceholderStyle;

/// Default age, in seconds, after which a cached field value is stale.
pub const DEFAULT_THRESHOLD_SECS: u64 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Marker written for each resolved placeholder; unset follows the
    /// data source's [`placeholder_style`](crate::driver::DataSource::placeholder_style)
    pub placeholder: Option<PlaceholderStyle>,
    pub cache: CacheConfig,
}

impl MapperConfig {
    #[must_use]
    pub const fn with_placeholder(mut self, placeholder: PlaceholderStyle) -> Self {
        self.placeholder = Some(placeholder);
        self
    }

    #[must_use]
    pub const fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
}

/// Settings of the per-unit-of-work field cache.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Field-filler results are memoized at all
    pub enabled: bool,
    /// Entries older than `threshold_secs` count as misses
    pub use_threshold: bool,
    pub threshold_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            use_threshold: true,
            threshold_secs: DEFAULT_THRESHOLD_SECS,
        }
    }
}

impl CacheConfig {
    pub const fn threshold(&self) -> Duration {
        Duration::from_secs(self.threshold_secs)
    }
}
