use crate::{gpu::transform::PerspectiveDivide, memory::BoundsPolicy};
use core::fmt;

pub const DEFAULT_WORKER_COUNT: usize = 4;
pub const MAX_WORKER_COUNT: usize = 8;

/// Renderer settings shared by every worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default, rename_all = "kebab-case")
)]
pub struct Config {
    /// Number of rasterizer threads; worker `i` owns every row `y` with `y % worker_count == i`.
    pub worker_count: usize,
    pub bounds_policy: BoundsPolicy,
    pub perspective_divide: PerspectiveDivide,
    /// Whether vertices get lit when the geometry mode asks for it.
    pub lighting: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            worker_count: DEFAULT_WORKER_COUNT,
            bounds_policy: BoundsPolicy::Fail,
            perspective_divide: PerspectiveDivide::Deferred,
            lighting: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    InvalidWorkerCount(usize),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidWorkerCount(count) => write!(
                f,
                "Invalid worker count {count}, expected 1 to {MAX_WORKER_COUNT}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_WORKER_COUNT).contains(&self.worker_count) {
            return Err(ConfigError::InvalidWorkerCount(self.worker_count));
        }
        Ok(())
    }
}
