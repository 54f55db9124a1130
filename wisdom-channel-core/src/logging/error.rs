use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum LoggingError {
    /// `try_init` refused: another global subscriber is installed
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),

    #[error("Unknown log level '{0}' (expected trace, debug, info, warn or error)")]
    UnknownLevel(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_level_names_the_choices() {
        let msg = LoggingError::UnknownLevel("loud".to_string()).to_string();
        assert!(msg.contains("'loud'"));
        assert!(msg.contains("warn"));
    }
}
