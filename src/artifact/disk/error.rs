//! Error taxonomy for the image build.

use thiserror::Error;

type Source = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a build stopped.
///
/// Step failures keep the underlying command or I/O error as their source,
/// so the full chain reaches the user through `anyhow`'s `{:#}` formatting.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Missing or invalid paths and parameters, detected before any mutation.
    #[error("invalid input: {0}")]
    Input(String),

    /// Not running with the privilege loop devices and mounts require.
    #[error("insufficient privilege: {0}")]
    Privilege(String),

    #[error("I/O failure: {step}")]
    Io {
        step: String,
        #[source]
        source: Source,
    },

    /// Partition table, file system or label creation failed.
    #[error("format failure: {step}")]
    Format {
        step: String,
        #[source]
        source: Source,
    },

    /// Loop device attach/detach or mount/unmount failed.
    #[error("resource failure: {step}")]
    Resource {
        step: String,
        #[source]
        source: Source,
    },

    #[error("build interrupted by {0}")]
    Interrupted(&'static str),
}

impl BuildError {
    pub fn io(step: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Io {
            step: step.into(),
            source: source.into(),
        }
    }

    pub fn format(step: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Format {
            step: step.into(),
            source: source.into(),
        }
    }

    pub fn resource(step: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Resource {
            step: step.into(),
            source: source.into(),
        }
    }

    /// True when the failure happened after the build started mutating state.
    pub fn is_abort(&self) -> bool {
        !matches!(self, Self::Input(_) | Self::Privilege(_))
    }
}
