pub mod types;
pub mod validation;

pub use types::*;
pub use validation::{validate_caption, validate_filename, ValidationError, ValidationLimits};
