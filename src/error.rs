//! Error types for capture, encoding and template matching.

use std::path::PathBuf;

/// Why the GPU duplication path could not serve a particular call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnavailableReason {
    /// No new desktop frame arrived within the acquire timeout.
    NoNewFrame,
    /// The duplication interface lost access to the output (mode change,
    /// secure desktop, session lock). It is recreated before the next call.
    AccessLost,
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::NoNewFrame => "no new frame within timeout",
            Self::AccessLost => "duplication access lost",
        };
        f.write_str(text)
    }
}

/// Top-level error type for deskshot operations.
#[derive(Debug, thiserror::Error)]
pub enum DeskshotError {
    #[error("GPU capture unavailable: {0}")]
    Unavailable(UnavailableReason),

    #[error("Capture resource initialization failed: {0}")]
    ResourceInit(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Template image not found: {}", .0.display())]
    TemplateNotFound(PathBuf),

    #[error("Template image could not be decoded: {}", path.display())]
    TemplateDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Window not found: {0}")]
    WindowNotFound(String),

    #[error("Monitor {0} not found")]
    MonitorNotFound(usize),

    #[error("Encoding failed: {0}")]
    Encoding(String),

    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Platform(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used by callers to decide whether to retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    InvalidInput,
    Transient,
    Fatal,
}

/// Result type alias using DeskshotError.
pub type Result<T> = std::result::Result<T, DeskshotError>;

impl DeskshotError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    pub fn capture_failed(msg: impl Into<String>) -> Self {
        Self::CaptureFailed(msg.into())
    }

    pub fn resource_init(msg: impl Into<String>) -> Self {
        Self::ResourceInit(msg.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidArgument(_)
            | Self::TemplateNotFound(_)
            | Self::TemplateDecode { .. }
            | Self::WindowNotFound(_)
            | Self::MonitorNotFound(_) => ErrorClass::InvalidInput,
            Self::Unavailable(_) | Self::Cancelled => ErrorClass::Transient,
            Self::ResourceInit(_)
            | Self::Encoding(_)
            | Self::CaptureFailed(_)
            | Self::Platform(_)
            | Self::Io(_)
            | Self::Json(_) => ErrorClass::Fatal,
        }
    }

    /// Transient failures are retried by the caller on its next request,
    /// never looped internally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
