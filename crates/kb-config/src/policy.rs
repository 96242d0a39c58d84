//! Space and retention policy.

use serde::{Deserialize, Serialize};

const fn default_min_free_mb() -> u64 {
    500
}

const fn default_keep_count() -> usize {
    2
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Free space on the boot volume must stay strictly above this.
    #[serde(default = "default_min_free_mb")]
    pub min_free_mb: u64,

    /// Steady-state number of idle bisection kernels to retain.
    #[serde(default = "default_keep_count")]
    pub keep_count: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_free_mb: default_min_free_mb(),
            keep_count: default_keep_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        let config = PolicyConfig::default();
        assert_eq!(config.min_free_mb, 500);
        assert_eq!(config.keep_count, 2);
    }
}
