use std::time::Duration;

use crate::errors::AppError;

pub const DEFAULT_MAX_HIERARCHY_DEPTH: usize = 64;
pub const DEFAULT_CHECK_TIMEOUT_MS: u64 = 2_000;

/// Tunables for permission resolution.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Ancestors visited before a parent path is truncated
    pub max_hierarchy_depth: usize,
    /// Budget for one permission check at the request boundary
    pub check_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_hierarchy_depth: DEFAULT_MAX_HIERARCHY_DEPTH,
            check_timeout: Duration::from_millis(DEFAULT_CHECK_TIMEOUT_MS),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let max_hierarchy_depth = std::env::var("PERMISSION_MAX_HIERARCHY_DEPTH")
            .map(|val| val.parse::<usize>())
            .unwrap_or(Ok(DEFAULT_MAX_HIERARCHY_DEPTH))
            .map_err(|_| {
                AppError::configuration("PERMISSION_MAX_HIERARCHY_DEPTH must be a valid integer")
            })?;

        let timeout_ms = std::env::var("PERMISSION_CHECK_TIMEOUT_MS")
            .map(|val| val.parse::<u64>())
            .unwrap_or(Ok(DEFAULT_CHECK_TIMEOUT_MS))
            .map_err(|_| AppError::configuration("PERMISSION_CHECK_TIMEOUT_MS must be a valid integer"))?;

        if max_hierarchy_depth == 0 {
            return Err(AppError::configuration(
                "PERMISSION_MAX_HIERARCHY_DEPTH must be at least 1",
            ));
        }

        Ok(Self {
            max_hierarchy_depth,
            check_timeout: Duration::from_millis(timeout_ms),
        })
    }

    pub fn with_max_hierarchy_depth(mut self, depth: usize) -> Self {
        self.max_hierarchy_depth = depth;
        self
    }

    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_override_defaults() {
        let config = EngineConfig::default()
            .with_max_hierarchy_depth(3)
            .with_check_timeout(Duration::from_millis(50));

        assert_eq!(config.max_hierarchy_depth, 3);
        assert_eq!(config.check_timeout, Duration::from_millis(50));
        assert_eq!(EngineConfig::default().max_hierarchy_depth, DEFAULT_MAX_HIERARCHY_DEPTH);
    }
}
