// src/rabbitmq/errors.rs

use lapin::Error as LapinError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamDemoError {
    #[error("RabbitMQ connection error: {0}")]
    ConnectionError(String),

    #[error("RabbitMQ channel error: {0}")]
    ChannelError(String),

    #[error("Topology declaration failed for {object}: {source}")]
    TopologyError {
        object: String,
        #[source]
        source: LapinError,
    },

    #[error("RabbitMQ publish error: {0}")]
    PublishError(String),

    #[error("RabbitMQ consume error: {0}")]
    ConsumeError(String),

    #[error("RabbitMQ acknowledge error: {0}")]
    AckError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Lapin(#[from] LapinError),
}

// Custom Result type for RabbitMQ operations
pub type Result<T> = std::result::Result<T, StreamDemoError>;

impl StreamDemoError {
    pub fn topology(object: impl Into<String>, source: LapinError) -> Self {
        StreamDemoError::TopologyError {
            object: object.into(),
            source,
        }
    }
}
