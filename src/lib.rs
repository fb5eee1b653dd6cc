//! Publishes to and consumes from a RabbitMQ stream queue over AMQP 0-9-1.

pub mod config;
pub mod env;
pub mod message;
pub mod rabbitmq;

pub use config::AppConfig;
