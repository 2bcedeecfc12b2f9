use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    /// The capture target did not resolve to a capturable item.
    #[error("capture target is invalid: {reason}")]
    InvalidTarget { reason: String },

    /// The requested operation is not allowed in the session's current
    /// state (e.g. rebinding the sink while running).
    #[error("invalid session state: {reason}")]
    InvalidState { reason: String },

    #[error("capture backend unavailable: {reason}")]
    BackendUnavailable { reason: String },

    /// Failure inside the GPU capture pipeline: device creation, swap
    /// chain, frame pool, staging copy, map, or present.
    #[error("capture pipeline error: {0:#}")]
    Pipeline(#[from] anyhow::Error),
}

impl CaptureError {
    pub fn invalid_target(reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            reason: reason.into(),
        }
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    pub fn backend_unavailable(reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            reason: reason.into(),
        }
    }
}

pub type CaptureResult<T> = Result<T, CaptureError>;
