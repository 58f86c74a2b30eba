use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdaptcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Detection pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

/// Failures of a single key-value store or of the whole tier chain
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Store '{store}' is unavailable")]
    Unavailable { store: String },

    #[error("Store '{store}' failed: {details}")]
    Operation { store: String, details: String },

    #[error("Store '{store}' holds corrupt data: {details}")]
    Corrupt { store: String, details: String },

    #[error("All storage tiers exhausted while writing '{key}'")]
    Exhausted { key: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Pipeline initialization failed: {details}")]
    Initialization { details: String },

    #[error("Face estimation failed: {details}")]
    Estimation { details: String },

    #[error("Pipeline handle already released")]
    Released,

    #[error("Detection loop cannot start from state {state}")]
    InvalidState { state: String },
}

#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event channel closed")]
    ChannelClosed,
}

impl AdaptcamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Whether the error surfaces to the calling UI layer rather than being absorbed
    pub fn is_surfaced(&self) -> bool {
        matches!(
            self,
            Self::Pipeline(PipelineError::Initialization { .. })
                | Self::Storage(StorageError::Exhausted { .. })
        )
    }
}

impl StorageError {
    pub fn unavailable<S: Into<String>>(store: S) -> Self {
        Self::Unavailable {
            store: store.into(),
        }
    }

    pub fn operation<S: Into<String>, D: std::fmt::Display>(store: S, details: D) -> Self {
        Self::Operation {
            store: store.into(),
            details: details.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AdaptcamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_init_and_exhaustion_surface() {
        let init: AdaptcamError = PipelineError::Initialization {
            details: "no backend".to_string(),
        }
        .into();
        let exhausted: AdaptcamError = StorageError::Exhausted {
            key: "k".to_string(),
        }
        .into();
        let frame: AdaptcamError = PipelineError::Estimation {
            details: "flaky".to_string(),
        }
        .into();
        let tier: AdaptcamError = StorageError::unavailable("durable").into();

        assert!(init.is_surfaced());
        assert!(exhausted.is_surfaced());
        assert!(!frame.is_surfaced());
        assert!(!tier.is_surfaced());
    }

    #[test]
    fn test_error_messages() {
        let err = AdaptcamError::component("storage", "boom");
        assert_eq!(err.to_string(), "Component error in storage: boom");

        let err = StorageError::operation("session", "quota exceeded");
        assert_eq!(err.to_string(), "Store 'session' failed: quota exceeded");
    }
}
