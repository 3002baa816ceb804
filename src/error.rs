//! Error taxonomy for volume and section generation.
//!
//! Every variant is fatal to the volume or section being built. Nothing here
//! is retried; the caller decides whether to abort the enclosing image.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FdsError>;

/// Errors raised while assembling volumes or composing sections.
#[derive(Debug, Error)]
pub enum FdsError {
    /// Inconsistent flash description (placement conflicts, missing GUIDs,
    /// unresolvable tool bindings, runaway section nesting).
    #[error("configuration: {0}")]
    Configuration(String),

    /// Malformed GUID string or hex byte list.
    #[error("format: {0}")]
    Format(String),

    /// External tool missing, failed, timed out or produced nothing.
    #[error("build tool {tool}: {message}")]
    BuildTool { tool: String, message: String },

    /// No processing tool registered for a GUID-defined section.
    #[error("no tool registered for GUID-defined section {0}")]
    UnknownTool(String),

    /// Filesystem access failed.
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FdsError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        FdsError::Configuration(msg.into())
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        FdsError::Format(msg.into())
    }

    pub(crate) fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        FdsError::BuildTool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        FdsError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Attach a path to a bare `io::Result`.
pub(crate) trait IoContext<T> {
    fn at(self, path: &std::path::Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: &std::path::Path) -> Result<T> {
        self.map_err(|e| FdsError::io(path, e))
    }
}
