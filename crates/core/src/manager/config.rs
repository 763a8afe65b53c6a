//! Configuration for the pipeline manager.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Pipeline manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Root of the template tree (`<dir>/<name>/<version>/*.json`).
    #[serde(default = "default_pipeline_dir")]
    pub pipeline_dir: PathBuf,

    /// Ceiling on concurrently running instances. Zero or less is unbounded.
    #[serde(default = "default_max_running")]
    pub max_running_pipelines: i64,

    /// Start with an empty registry when the template tree is unreadable.
    #[serde(default)]
    pub ignore_init_errors: bool,
}

fn default_pipeline_dir() -> PathBuf {
    PathBuf::from("pipelines")
}

fn default_max_running() -> i64 {
    1
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            pipeline_dir: default_pipeline_dir(),
            max_running_pipelines: default_max_running(),
            ignore_init_errors: false,
        }
    }
}

impl ManagerConfig {
    /// Sets the template directory.
    pub fn with_pipeline_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pipeline_dir = dir.into();
        self
    }

    /// Sets the running ceiling.
    pub fn with_max_running(mut self, max: i64) -> Self {
        self.max_running_pipelines = max;
        self
    }

    pub fn with_ignore_init_errors(mut self, ignore: bool) -> Self {
        self.ignore_init_errors = ignore;
        self
    }

    /// The ceiling, or `None` when unbounded.
    pub fn max_running(&self) -> Option<usize> {
        (self.max_running_pipelines > 0).then_some(self.max_running_pipelines as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ManagerConfig::default();
        assert_eq!(config.pipeline_dir, PathBuf::from("pipelines"));
        assert_eq!(config.max_running(), Some(1));
        assert!(!config.ignore_init_errors);
    }

    #[test]
    fn test_non_positive_ceiling_is_unbounded() {
        assert_eq!(ManagerConfig::default().with_max_running(0).max_running(), None);
        assert_eq!(ManagerConfig::default().with_max_running(-1).max_running(), None);
        assert_eq!(ManagerConfig::default().with_max_running(4).max_running(), Some(4));
    }
}
