use thiserror::Error;

/// Failure taxonomy for the batch engine.
///
/// `Configuration` and `InvalidInput` abort a dispatch before any external
/// call is made. `Generation` and `Unknown` only ever travel inside a
/// `Settlement::Rejected` and never abort sibling tasks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    Generation(String),
    #[error("An unknown error occurred.")]
    Unknown,
}

impl EngineError {
    /// Human-readable text for display on a result record.
    pub fn display_message(&self) -> String {
        self.to_string()
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Generation(format!("Failed to generate image: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::EngineError;

    #[test]
    fn unknown_renders_generic_message() {
        assert_eq!(
            EngineError::Unknown.display_message(),
            "An unknown error occurred."
        );
    }

    #[test]
    fn generation_passes_message_through_unwrapped() {
        let err = EngineError::Generation("Request was blocked. Reason: SAFETY.".to_string());
        assert_eq!(err.display_message(), "Request was blocked. Reason: SAFETY.");
    }

    #[test]
    fn configuration_and_input_are_prefixed() {
        assert_eq!(
            EngineError::Configuration("window must be at least 1".to_string()).to_string(),
            "invalid configuration: window must be at least 1"
        );
        assert_eq!(
            EngineError::InvalidInput("fusion requires at least 2 images".to_string()).to_string(),
            "invalid input: fusion requires at least 2 images"
        );
    }
}
