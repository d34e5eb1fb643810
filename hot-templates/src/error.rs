//! Error types for the template store.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for template store operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

/// Errors that can occur while loading, reloading or rendering templates.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// Template root does not exist or is not a directory.
    #[error("template root not found: {0}")]
    RootNotFound(PathBuf),

    /// A template file could not be read.
    #[error("failed to read {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Walking the template tree failed.
    #[error("failed to walk template tree: {0}")]
    Walk(#[from] walkdir::Error),

    /// A template failed to parse.
    #[error("failed to compile {name}: {source}")]
    Compile {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    /// No template with this name in the active set.
    #[error("template not found: {0}")]
    NotFound(String),

    /// The engine failed while rendering.
    #[error("failed to render {name}: {source}")]
    Render {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    /// Writing rendered output failed.
    #[error("failed to write output: {0}")]
    Write(#[source] std::io::Error),

    /// Notify error.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    /// Watching requires a tokio runtime.
    #[error("watching requires a running tokio runtime")]
    WatchUnavailable,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl TemplateError {
    /// Whether the error came from building a template set (scan or compile)
    /// as opposed to serving a render request.
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            Self::RootNotFound(_) | Self::Scan { .. } | Self::Walk(_) | Self::Compile { .. }
        )
    }
}
