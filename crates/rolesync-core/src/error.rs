use thiserror::Error;

/// Core error types for rolesync model operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid resource kind: {0}")]
    InvalidKind(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid resource data: {message}")]
    InvalidResource { message: String },
}

impl CoreError {
    /// Create a new InvalidKind error
    pub fn invalid_kind(kind: impl Into<String>) -> Self {
        Self::InvalidKind(kind.into())
    }

    /// Create a new InvalidKey error
    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::InvalidKey(key.into())
    }

    /// Create a new InvalidResource error
    pub fn invalid_resource(message: impl Into<String>) -> Self {
        Self::InvalidResource {
            message: message.into(),
        }
    }

    /// Check if this error was caused by malformed input rather than the system
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidKind(_) | Self::InvalidKey(_) | Self::InvalidResource { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            CoreError::invalid_kind("Pod").to_string(),
            "Invalid resource kind: Pod"
        );
        assert_eq!(
            CoreError::invalid_key("a/b/c").to_string(),
            "Invalid object key: a/b/c"
        );
        assert_eq!(
            CoreError::invalid_resource("missing name").to_string(),
            "Invalid resource data: missing name"
        );
    }

    #[test]
    fn test_validation_classification() {
        assert!(CoreError::invalid_kind("Pod").is_validation_error());
        assert!(CoreError::invalid_key("").is_validation_error());

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(!CoreError::from(json_err).is_validation_error());
    }
}
