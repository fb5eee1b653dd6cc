// src/rabbitmq/mod.rs
// RabbitMQ plumbing for the stream demo

pub mod errors;
pub mod connection;
pub mod offset;
pub mod topology;
pub mod consumer;
pub mod publisher;

// Re-export specific items to simplify imports elsewhere
pub use connection::{ConnectionManager, RetryPolicy};
pub use consumer::{DeliveryHandler, PrintingHandler, StreamConsumer};
pub use errors::{Result, StreamDemoError};
pub use offset::StreamOffset;
pub use publisher::{PublishStop, StreamPublisher};
pub use topology::StreamTopology;
