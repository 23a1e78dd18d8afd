#[derive(Debug, thiserror::Error)]
pub enum StampedeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Engine error: {0}")]
    Engine(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = StampedeError::Config("stages must not be empty".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: stages must not be empty"
        );
    }

    #[test]
    fn engine_error_display() {
        let err = StampedeError::Engine("worker channel closed".to_string());
        assert_eq!(err.to_string(), "Engine error: worker channel closed");
    }

    #[test]
    fn io_error_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StampedeError = io_err.into();
        let msg = err.to_string();
        assert!(msg.contains("IO error"));
        assert!(msg.contains("file not found"));
    }

    #[test]
    fn serde_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("not valid json").unwrap_err();
        let err: StampedeError = json_err.into();
        assert!(err.to_string().contains("Serialization error"));
    }

    #[test]
    fn error_is_debug() {
        let err = StampedeError::Config("test".to_string());
        let debug = format!("{:?}", err);
        assert!(debug.contains("Config"));
    }
}
