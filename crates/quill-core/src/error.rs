use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("send already in progress")]
    Busy,
    #[error("validation {0}")]
    Validation(String),
    #[error("already recording")]
    AlreadyRecording,
    #[error("attachment exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("transport {0}")]
    Transport(String),
    #[error("storage")]
    Storage,
    #[error("capture {0}")]
    Capture(String),
    #[error("provider {0}")]
    Provider(String),
    #[error("encryption not allowed")]
    NotAllowed,
    #[error("not found")]
    NotFound,
}

impl From<quill_api::ValidationError> for ComposeError {
    fn from(err: quill_api::ValidationError) -> Self {
        ComposeError::Validation(err.to_string())
    }
}
