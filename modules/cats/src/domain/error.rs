use thiserror::Error;

/// Errors raised by the cats domain; rendered by `CatsErrorFilter`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatsError {
    #[error("cat {id} not found")]
    NotFound { id: u32 },

    #[error("a cat named '{name}' already exists")]
    Conflict { name: String },

    #[error("invalid cat: {message}")]
    Validation { message: String },
}

impl CatsError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
