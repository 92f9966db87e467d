//! Filepath: src/config.rs
//!
//! Pool configuration.
//!
//! [`PoolConfig`] fixes the geometry of a pool at format time: how many
//! records fit in one node and how many nodes and value cells the arena can
//! hand out. The cardinality is recorded in the superblock and checked again
//! when a pool image is reopened.

use std::env;

use crate::error::ConfigError;

// ============================================================================
//  Constants
// ============================================================================

/// Bytes in one node page.
pub const PAGE_SIZE: usize = 512;

/// Bytes in one cache line (and one node header).
pub const CACHE_LINE_SIZE: usize = 64;

/// Bytes in one `(key, ptr)` record.
pub const RECORD_SIZE: usize = 16;

/// Records per node derived from a 512-byte page with a one-line header.
pub const DEFAULT_CARDINALITY: usize = (PAGE_SIZE - CACHE_LINE_SIZE) / RECORD_SIZE;

/// Smallest cardinality that keeps both halves of a split non-empty.
pub const MIN_CARDINALITY: usize = 3;

/// Largest accepted cardinality.
pub const MAX_CARDINALITY: usize = 1 << 12;

/// Default number of node slots.
pub const DEFAULT_NODE_CAPACITY: usize = 1 << 14;

/// Default number of value cells.
pub const DEFAULT_VALUE_CAPACITY: usize = 1 << 18;

/// Largest accepted arena capacity.
pub const MAX_CAPACITY: usize = 1 << 28;

/// Environment override for the cardinality.
pub const ENV_CARDINALITY: &str = "FASTFAIR_CARDINALITY";

/// Environment override for the node capacity.
pub const ENV_NODE_CAPACITY: &str = "FASTFAIR_NODE_CAPACITY";

/// Environment override for the value capacity.
pub const ENV_VALUE_CAPACITY: &str = "FASTFAIR_VALUE_CAPACITY";

// ============================================================================
//  PoolConfig
// ============================================================================

/// Geometry of a persistent pool.
///
/// # Example
///
/// ```rust
/// use fastfair::PoolConfig;
///
/// let config = PoolConfig::new().with_cardinality(4).with_node_capacity(64);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum live records per node.
    pub cardinality: usize,

    /// Number of node slots in the arena.
    pub node_capacity: usize,

    /// Number of value cells in the arena.
    pub value_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolConfig {
    /// Default geometry: 512-byte pages.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cardinality: DEFAULT_CARDINALITY,
            node_capacity: DEFAULT_NODE_CAPACITY,
            value_capacity: DEFAULT_VALUE_CAPACITY,
        }
    }

    /// Set the records-per-node limit.
    #[must_use]
    pub const fn with_cardinality(mut self, cardinality: usize) -> Self {
        self.cardinality = cardinality;
        self
    }

    /// Set the number of node slots.
    #[must_use]
    pub const fn with_node_capacity(mut self, capacity: usize) -> Self {
        self.node_capacity = capacity;
        self
    }

    /// Set the number of value cells.
    #[must_use]
    pub const fn with_value_capacity(mut self, capacity: usize) -> Self {
        self.value_capacity = capacity;
        self
    }

    /// Defaults overridden by `FASTFAIR_*` environment variables.
    ///
    /// # Errors
    ///
    /// As [`from_vars`](Self::from_vars).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|var| env::var(var).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the
    /// `FASTFAIR_*` names. [`from_env`](Self::from_env) passes the process
    /// environment.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Env`] if a variable is set but is not an integer, or any
    /// error from [`validate`](Self::validate).
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let read = |var: &'static str| -> Result<Option<usize>, ConfigError> {
            lookup(var)
                .map(|raw| {
                    raw.trim()
                        .parse::<usize>()
                        .map_err(|_| ConfigError::Env { var, value: raw })
                })
                .transpose()
        };

        let mut config = Self::new();
        if let Some(value) = read(ENV_CARDINALITY)? {
            config.cardinality = value;
        }
        if let Some(value) = read(ENV_NODE_CAPACITY)? {
            config.node_capacity = value;
        }
        if let Some(value) = read(ENV_VALUE_CAPACITY)? {
            config.value_capacity = value;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check every field against its accepted range.
    ///
    /// # Errors
    ///
    /// The first out-of-range field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cardinality < MIN_CARDINALITY || self.cardinality > MAX_CARDINALITY {
            return Err(ConfigError::Cardinality {
                value: self.cardinality,
                min: MIN_CARDINALITY,
                max: MAX_CARDINALITY,
            });
        }
        if self.node_capacity == 0 || self.node_capacity > MAX_CAPACITY {
            return Err(ConfigError::Capacity {
                name: "node",
                value: self.node_capacity,
                max: MAX_CAPACITY,
            });
        }
        if self.value_capacity == 0 || self.value_capacity > MAX_CAPACITY {
            return Err(ConfigError::Capacity {
                name: "value",
                value: self.value_capacity,
                max: MAX_CAPACITY,
            });
        }
        Ok(())
    }

    /// Words occupied by one node: header line plus records, rounded up to
    /// whole cache lines.
    #[must_use]
    pub const fn node_words(&self) -> usize {
        let words: usize = HEADER_WORDS + 2 * self.cardinality;
        words.div_ceil(LINE_WORDS) * LINE_WORDS
    }
}

/// Words per cache line.
pub(crate) const LINE_WORDS: usize = CACHE_LINE_SIZE / 8;

/// Words in a node header.
pub(crate) const HEADER_WORDS: usize = LINE_WORDS;
