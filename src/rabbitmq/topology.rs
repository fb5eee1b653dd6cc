// src/rabbitmq/topology.rs
//! Exchange, stream queue and binding declarations.

use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable, LongString, ShortString},
    Channel, ExchangeKind,
};
use tracing::{debug, info};

use super::errors::{Result, StreamDemoError};
use crate::config::TopologyConfig;

pub const X_QUEUE_TYPE: &str = "x-queue-type";
pub const X_MAX_LENGTH_BYTES: &str = "x-max-length-bytes";
pub const X_STREAM_MAX_SEGMENT_SIZE_BYTES: &str = "x-stream-max-segment-size-bytes";
pub const X_MAX_AGE: &str = "x-max-age";

pub fn parse_exchange_kind(kind: &str) -> std::result::Result<ExchangeKind, String> {
    match kind.trim().to_ascii_lowercase().as_str() {
        "direct" => Ok(ExchangeKind::Direct),
        "fanout" => Ok(ExchangeKind::Fanout),
        "topic" => Ok(ExchangeKind::Topic),
        "headers" => Ok(ExchangeKind::Headers),
        other => Err(format!(
            "unsupported exchange kind '{}': expected direct, fanout, topic or headers",
            other
        )),
    }
}

/// Checks a stream retention age such as `7D` or `12h`.
pub fn validate_max_age(max_age: &str) -> std::result::Result<(), String> {
    let Some(unit) = max_age.chars().last() else {
        return Err("max age cannot be empty".to_string());
    };
    let digits = &max_age[..max_age.len() - unit.len_utf8()];

    if !matches!(unit, 'Y' | 'M' | 'D' | 'h' | 'm' | 's') {
        return Err(format!(
            "invalid max age '{}': unit must be one of Y, M, D, h, m, s",
            max_age
        ));
    }
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!(
            "invalid max age '{}': expected a number followed by a unit",
            max_age
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeDefinition {
    pub name: String,
    pub kind: ExchangeKind,
    pub durable: bool,
    pub auto_delete: bool,
}

impl ExchangeDefinition {
    pub fn durable(name: &str, kind: ExchangeKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            durable: true,
            auto_delete: false,
        }
    }

    fn options(&self) -> ExchangeDeclareOptions {
        ExchangeDeclareOptions {
            durable: self.durable,
            auto_delete: self.auto_delete,
            ..ExchangeDeclareOptions::default()
        }
    }
}

/// A durable queue with `x-queue-type = stream`.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamQueueDefinition {
    pub name: String,
    pub durable: bool,
    pub max_length_bytes: Option<i64>,
    pub max_segment_size_bytes: Option<i64>,
    pub max_age: Option<String>,
}

impl StreamQueueDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            durable: true,
            max_length_bytes: None,
            max_segment_size_bytes: None,
            max_age: None,
        }
    }

    pub fn max_length_bytes(mut self, bytes: i64) -> Self {
        self.max_length_bytes = Some(bytes);
        self
    }

    pub fn max_segment_size_bytes(mut self, bytes: i64) -> Self {
        self.max_segment_size_bytes = Some(bytes);
        self
    }

    pub fn max_age(mut self, age: &str) -> Self {
        self.max_age = Some(age.to_string());
        self
    }

    pub fn arguments(&self) -> FieldTable {
        let mut args = FieldTable::default();
        args.insert(
            ShortString::from(X_QUEUE_TYPE),
            AMQPValue::LongString(LongString::from("stream")),
        );

        if let Some(bytes) = self.max_length_bytes {
            args.insert(
                ShortString::from(X_MAX_LENGTH_BYTES),
                AMQPValue::LongLongInt(bytes),
            );
        }

        if let Some(bytes) = self.max_segment_size_bytes {
            args.insert(
                ShortString::from(X_STREAM_MAX_SEGMENT_SIZE_BYTES),
                AMQPValue::LongLongInt(bytes),
            );
        }

        if let Some(age) = &self.max_age {
            args.insert(
                ShortString::from(X_MAX_AGE),
                AMQPValue::LongString(LongString::from(age.as_str())),
            );
        }

        args
    }

    fn options(&self) -> QueueDeclareOptions {
        // Streams must be durable and cannot be exclusive or auto-delete.
        QueueDeclareOptions {
            durable: self.durable,
            auto_delete: false,
            exclusive: false,
            ..QueueDeclareOptions::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamTopology {
    pub exchange: ExchangeDefinition,
    pub queue: StreamQueueDefinition,
    pub binding: QueueBinding,
}

impl StreamTopology {
    pub fn from_config(config: &TopologyConfig) -> Result<Self> {
        let kind =
            parse_exchange_kind(&config.exchange_kind).map_err(StreamDemoError::ConfigError)?;

        let mut queue = StreamQueueDefinition::new(&config.queue);
        if let Some(bytes) = config.max_length_bytes {
            queue = queue.max_length_bytes(bytes);
        }
        if let Some(bytes) = config.max_segment_size_bytes {
            queue = queue.max_segment_size_bytes(bytes);
        }
        if let Some(age) = &config.max_age {
            validate_max_age(age).map_err(StreamDemoError::ConfigError)?;
            queue = queue.max_age(age);
        }

        Ok(Self {
            exchange: ExchangeDefinition::durable(&config.exchange, kind),
            binding: QueueBinding {
                queue: config.queue.clone(),
                exchange: config.exchange.clone(),
                routing_key: config.routing_key().to_string(),
            },
            queue,
        })
    }

    /// Declares the exchange, then the stream queue, then the binding.
    pub async fn declare(&self, channel: &Channel) -> Result<()> {
        debug!(exchange = %self.exchange.name, kind = ?self.exchange.kind, "Declaring exchange");
        channel
            .exchange_declare(
                &self.exchange.name,
                self.exchange.kind.clone(),
                self.exchange.options(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                StreamDemoError::topology(format!("exchange '{}'", self.exchange.name), e)
            })?;

        let queue = channel
            .queue_declare(&self.queue.name, self.queue.options(), self.queue.arguments())
            .await
            .map_err(|e| {
                StreamDemoError::topology(format!("stream queue '{}'", self.queue.name), e)
            })?;

        info!(
            queue = %self.queue.name,
            messages = queue.message_count(),
            consumers = queue.consumer_count(),
            "Stream queue declared"
        );

        channel
            .queue_bind(
                &self.binding.queue,
                &self.binding.exchange,
                &self.binding.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                StreamDemoError::topology(
                    format!("binding '{}' -> '{}'", self.binding.exchange, self.binding.queue),
                    e,
                )
            })?;

        info!(
            exchange = %self.binding.exchange,
            queue = %self.binding.queue,
            routing_key = %self.binding.routing_key,
            "Queue bound to exchange"
        );

        Ok(())
    }
}
