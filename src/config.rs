//! Kernel configuration.
//!
//! Options come from code, from `FERROUS_KERNEL_*` environment variables, or
//! (feature `config`) from JSON.

use std::env;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::error::{DiError, DiResult};
use crate::lifetime::PoolSettings;

const ENV_PREFIX: &str = "FERROUS_KERNEL";

/// Tunables applied to every resolution of one kernel.
///
/// # Examples
///
/// ```rust
/// use ferrous_kernel::{Kernel, KernelOptions};
///
/// let options = KernelOptions::default()
///     .with_max_resolution_depth(64)
///     .with_propagated_arguments(true);
/// let kernel = Kernel::with_options(options);
/// assert_eq!(kernel.options().max_resolution_depth, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct KernelOptions {
    /// Nested resolutions allowed before failing with `DepthExceeded`
    pub max_resolution_depth: usize,
    /// Inline arguments apply to nested resolutions, not only the top one
    pub propagate_inline_arguments: bool,
    /// Pool bounds used by `Lifestyle::pooled_default`
    pub default_pool: PoolSettings,
    /// Log a warning when a kernel is dropped without `dispose`
    pub warn_on_undisposed_drop: bool,
}

impl Default for KernelOptions {
    fn default() -> Self {
        Self {
            max_resolution_depth: 1024,
            propagate_inline_arguments: false,
            default_pool: PoolSettings::default(),
            warn_on_undisposed_drop: true,
        }
    }
}

impl KernelOptions {
    pub fn with_max_resolution_depth(mut self, depth: usize) -> Self {
        self.max_resolution_depth = depth;
        self
    }

    pub fn with_propagated_arguments(mut self, propagate: bool) -> Self {
        self.propagate_inline_arguments = propagate;
        self
    }

    pub fn with_default_pool(mut self, settings: PoolSettings) -> Self {
        self.default_pool = settings;
        self
    }

    pub fn with_drop_warning(mut self, warn: bool) -> Self {
        self.warn_on_undisposed_drop = warn;
        self
    }

    /// Defaults overridden by any `FERROUS_KERNEL_*` variables that are set.
    ///
    /// Recognized: `MAX_DEPTH`, `PROPAGATE_ARGUMENTS`, `POOL_INITIAL`,
    /// `POOL_MAX`, `WARN_ON_DROP`.
    pub fn from_env() -> DiResult<Self> {
        let mut options = Self::default();
        if let Some(depth) = env_value::<usize>("MAX_DEPTH")? {
            options.max_resolution_depth = depth;
        }
        if let Some(propagate) = env_value::<bool>("PROPAGATE_ARGUMENTS")? {
            options.propagate_inline_arguments = propagate;
        }
        let initial = env_value::<usize>("POOL_INITIAL")?.unwrap_or(options.default_pool.initial_size);
        let max = env_value::<usize>("POOL_MAX")?.unwrap_or(options.default_pool.max_size);
        options.default_pool = PoolSettings::new(initial, max);
        if let Some(warn) = env_value::<bool>("WARN_ON_DROP")? {
            options.warn_on_undisposed_drop = warn;
        }
        options.validate()?;
        Ok(options)
    }

    /// Parses options from JSON; missing fields keep their defaults.
    #[cfg(feature = "config")]
    pub fn from_json(json: &str) -> DiResult<Self> {
        let options: Self =
            serde_json::from_str(json).map_err(|e| DiError::Configuration(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    #[cfg(feature = "config")]
    pub fn to_json(&self) -> DiResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| DiError::Configuration(e.to_string()))
    }

    pub fn validate(&self) -> DiResult<()> {
        if self.max_resolution_depth == 0 {
            return Err(DiError::Configuration(
                "max_resolution_depth must be at least 1".into(),
            ));
        }
        if self.default_pool.max_size == 0 {
            return Err(DiError::Configuration("default pool max_size must be at least 1".into()));
        }
        Ok(())
    }
}

fn env_value<T: std::str::FromStr>(suffix: &str) -> DiResult<Option<T>> {
    let key = format!("{}_{}", ENV_PREFIX, suffix);
    match env::var(&key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| DiError::Configuration(format!("{key} has invalid value '{raw}'"))),
        Err(_) => Ok(None),
    }
}
