//! Recognition service defaults.

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

fn default_match_threshold() -> f32 {
    0.5
}

fn default_top_k() -> usize {
    5
}

fn default_age() -> u32 {
    25
}

/// Configuration for [`FaceIndexService`](crate::service::FaceIndexService).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Matches must score strictly above this. Range [-1, 1]. Default: 0.5
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,

    /// k used by `identify` when the caller passes none. Default: 5
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Age used when the caller omits it and prediction fails. Default: 25
    #[serde(default = "default_age")]
    pub default_age: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            default_top_k: default_top_k(),
            default_age: default_age(),
        }
    }
}

impl ServiceConfig {
    /// # Errors
    /// - `StoreError::InvalidConfig` if match_threshold is outside [-1, 1]
    /// - `StoreError::InvalidConfig` if default_top_k is 0
    pub fn validate(&self) -> StoreResult<()> {
        if !(-1.0..=1.0).contains(&self.match_threshold) {
            return Err(StoreError::InvalidConfig(format!(
                "match_threshold ({}) must be in [-1, 1]",
                self.match_threshold
            )));
        }

        if self.default_top_k == 0 {
            return Err(StoreError::InvalidConfig(
                "default_top_k must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
