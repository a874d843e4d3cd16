//! Error types for the monitoring core

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the orchestrator and rule handling
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Configuration is structurally invalid
    #[error("invalid monitor configuration: {0}")]
    InvalidConfig(String),

    /// An alert rule cannot be turned into thresholds
    #[error("invalid alert rule for {parameter}: {reason}")]
    InvalidRule { parameter: String, reason: String },

    /// A capacity fact could not be gathered at startup
    #[error("capacity probe failed for {what}: {source}")]
    CapacityProbe {
        what: String,
        #[source]
        source: SourceError,
    },

    /// A node provider failed
    #[error("node provider failed: {0}")]
    Provider(#[source] SourceError),

    /// The averaging window holds no sample for the entity
    #[error("no averaged monitoring data for {entity}")]
    NoData { entity: String },

    /// The monitor was built without an averaging window
    #[error("averaging window is not configured")]
    AveragingDisabled,

    /// The instance is not under monitoring
    #[error("instance {0} is not monitored")]
    UnknownInstance(String),

    /// The instance id cannot name a cgroup directory
    #[error("invalid instance id {0:?}")]
    InvalidInstanceId(String),
}

impl MonitorError {
    pub(crate) fn invalid_rule(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }
}

/// Errors returned by sample-source collaborators
#[derive(Debug, Error)]
pub enum SourceError {
    /// The backend does not know the instance
    #[error("instance {0} is unknown to the backend")]
    UnknownInstance(String),

    /// Reading a source file or directory failed
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Source data could not be parsed
    #[error("failed to parse {what}: {detail}")]
    Parse { what: String, detail: String },

    /// Any other backend failure
    #[error("{0}")]
    Backend(String),
}

impl SourceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true when the failure means the instance is unknown
    pub fn is_unknown_instance(&self) -> bool {
        matches!(self, SourceError::UnknownInstance(_))
    }
}

pub type Result<T, E = MonitorError> = std::result::Result<T, E>;
