use thiserror::Error;

/// Failures that end a monitoring session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to capture frame from camera")]
    Capture(#[source] anyhow::Error),
    #[error("failed to render frame")]
    Render(#[source] anyhow::Error),
    #[error("object detection failed")]
    Detector(#[source] anyhow::Error),
}

impl SessionError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            SessionError::Capture(_) => 2,
            SessionError::Render(_) => 3,
            SessionError::Detector(_) => 4,
        }
    }
}
