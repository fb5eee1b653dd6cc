use lapin::{Channel, Connection, ConnectionProperties};
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

use super::errors::{Result, StreamDemoError};
use crate::config::{redact_uri, ConnectionConfig};

/// Exponential backoff bounded by an overall deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub deadline: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.initial_retry_delay_ms),
            max_delay: Duration::from_millis(
                config.max_retry_delay_ms.max(config.initial_retry_delay_ms),
            ),
            deadline: config.connect_deadline(),
        }
    }

    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay)
    }

    /// Spreads `delay` by up to 15% in either direction.
    pub fn jittered(&self, delay: Duration) -> Duration {
        let factor = 1.0 + (rand::random::<f64>() * 0.3 - 0.15);
        delay.mul_f64(factor)
    }
}

pub struct ConnectionManager {
    uri: String,
    connection_name: String,
    policy: RetryPolicy,
    connection: Option<Connection>,
}

impl ConnectionManager {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            uri: config.uri.clone(),
            connection_name: config.connection_name.clone(),
            policy: RetryPolicy::from_config(config),
            connection: None,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn properties(&self) -> ConnectionProperties {
        ConnectionProperties::default()
            .with_connection_name(self.connection_name.clone().into())
    }

    /// Connects, retrying with backoff until the policy's deadline elapses.
    pub async fn connect(&mut self) -> Result<&Connection> {
        if self.is_connected() {
            return self
                .connection
                .as_ref()
                .ok_or_else(|| {
                    StreamDemoError::ConnectionError("No active connection".to_string())
                });
        }

        let started = Instant::now();
        let mut delay = self.policy.initial_delay;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            info!(
                uri = %redact_uri(&self.uri),
                attempt = attempts,
                "Attempting to connect to RabbitMQ"
            );

            // A single attempt can hang on a silent host, so it only gets
            // what is left of the deadline.
            let remaining = self.policy.deadline.saturating_sub(started.elapsed());
            let attempt = Connection::connect(&self.uri, self.properties());
            let failure = match timeout(remaining, attempt).await {
                Ok(Ok(connection)) => {
                    info!(connection_name = %self.connection_name, "Connected to RabbitMQ");
                    let connection: &Connection = self.connection.insert(connection);
                    return Ok(connection);
                }
                Ok(Err(err)) => err.to_string(),
                Err(_) => format!("attempt timed out after {:?}", remaining),
            };
            warn!(attempt = attempts, error = %failure, "Failed to connect to RabbitMQ");

            let elapsed = started.elapsed();
            if elapsed >= self.policy.deadline {
                error!(attempts, "Giving up on RabbitMQ connection");
                return Err(StreamDemoError::TimeoutError(format!(
                    "could not connect to {} within {:?} ({} attempts): {}",
                    redact_uri(&self.uri),
                    self.policy.deadline,
                    attempts,
                    failure
                )));
            }

            let wait = self.policy.jittered(delay).min(self.policy.deadline - elapsed);
            debug!("Waiting {}ms before next connection attempt", wait.as_millis());
            sleep(wait).await;

            delay = self.policy.next_delay(delay);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|conn| conn.status().connected())
    }

    pub async fn create_channel(&self) -> Result<Channel> {
        let connection = self
            .connection
            .as_ref()
            .filter(|conn| conn.status().connected())
            .ok_or_else(|| StreamDemoError::ConnectionError("No active connection".to_string()))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| StreamDemoError::ChannelError(e.to_string()))?;

        debug!(channel_id = channel.id(), "Channel opened");
        Ok(channel)
    }

    pub async fn close(&mut self) -> Result<()> {
        if let Some(connection) = self.connection.take() {
            if connection.status().connected() {
                info!("Closing RabbitMQ connection gracefully");
                connection
                    .close(200, "Normal shutdown")
                    .await
                    .map_err(|e| StreamDemoError::ConnectionError(e.to_string()))?;
            }
        }
        Ok(())
    }
}
