use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationLimits {
    pub max_text_bytes: usize,
    pub max_filename_len: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_text_bytes: 16 * 1024,
            max_filename_len: 255,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is empty")]
    Empty(&'static str),
    #[error("{field} exceeds {max} bytes")]
    TooLong { field: &'static str, max: usize },
}

pub fn validate_caption(text: &str, limits: &ValidationLimits) -> Result<(), ValidationError> {
    if text.len() > limits.max_text_bytes {
        return Err(ValidationError::TooLong {
            field: "text",
            max: limits.max_text_bytes,
        });
    }
    Ok(())
}

pub fn validate_filename(name: &str, limits: &ValidationLimits) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::Empty("filename"));
    }
    if name.len() > limits.max_filename_len {
        return Err(ValidationError::TooLong {
            field: "filename",
            max: limits.max_filename_len,
        });
    }
    Ok(())
}
