//! Store configuration.

/// Default hard cap on clauses produced by DNF normalization.
pub const DEFAULT_MAX_NORMALIZED_CLAUSES: usize = ormkit_lang::DEFAULT_MAX_CLAUSES;

/// Default clause count above which normalization logs a warning.
pub const DEFAULT_WARN_NORMALIZED_CLAUSES: usize = 128;

/// Default maximum depth of an include path.
pub const DEFAULT_MAX_PRELOAD_DEPTH: usize = 8;

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Normalizing a filter into more clauses than this fails.
    pub max_normalized_clauses: usize,

    /// Normalizing a filter into more clauses than this logs a warning.
    pub warn_normalized_clauses: usize,

    /// Include paths with more segments than this are rejected.
    pub max_preload_depth: usize,
}

impl StoreConfig {
    /// Create a configuration with default limits.
    pub fn new() -> Self {
        Self {
            max_normalized_clauses: DEFAULT_MAX_NORMALIZED_CLAUSES,
            warn_normalized_clauses: DEFAULT_WARN_NORMALIZED_CLAUSES,
            max_preload_depth: DEFAULT_MAX_PRELOAD_DEPTH,
        }
    }

    /// Set the normalization clause cap.
    pub fn with_max_normalized_clauses(mut self, limit: usize) -> Self {
        self.max_normalized_clauses = limit;
        self
    }

    /// Set the normalization warning threshold.
    pub fn with_warn_normalized_clauses(mut self, threshold: usize) -> Self {
        self.warn_normalized_clauses = threshold;
        self
    }

    /// Set the maximum include depth.
    pub fn with_max_preload_depth(mut self, depth: usize) -> Self {
        self.max_preload_depth = depth;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.max_normalized_clauses, 1024);
        assert_eq!(config.warn_normalized_clauses, DEFAULT_WARN_NORMALIZED_CLAUSES);
        assert_eq!(config.max_preload_depth, DEFAULT_MAX_PRELOAD_DEPTH);
    }

    #[test]
    fn test_config_builder() {
        let config = StoreConfig::new()
            .with_max_normalized_clauses(64)
            .with_warn_normalized_clauses(8)
            .with_max_preload_depth(2);

        assert_eq!(config.max_normalized_clauses, 64);
        assert_eq!(config.warn_normalized_clauses, 8);
        assert_eq!(config.max_preload_depth, 2);
    }
}
