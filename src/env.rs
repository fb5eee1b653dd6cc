use anyhow::{anyhow, Result};
use std::str::FromStr;

use crate::config::AppConfig;

pub const AMQP_ADDR: &str = "AMQP_ADDR";
pub const AMQP_CONNECTION_NAME: &str = "AMQP_CONNECTION_NAME";
pub const AMQP_CONNECT_DEADLINE_SECS: &str = "AMQP_CONNECT_DEADLINE_SECS";
pub const STREAM_EXCHANGE: &str = "STREAM_EXCHANGE";
pub const STREAM_QUEUE: &str = "STREAM_QUEUE";
pub const STREAM_ROUTING_KEY: &str = "STREAM_ROUTING_KEY";
pub const STREAM_OFFSET: &str = "STREAM_OFFSET";
pub const STREAM_MAX_AGE: &str = "STREAM_MAX_AGE";
pub const CONSUMER_TAG: &str = "CONSUMER_TAG";
pub const PREFETCH_COUNT: &str = "PREFETCH_COUNT";
pub const PUBLISH_INTERVAL_MS: &str = "PUBLISH_INTERVAL_MS";
pub const PUBLISH_PAYLOAD: &str = "PUBLISH_PAYLOAD";
pub const PUBLISH_CONFIRM: &str = "PUBLISH_CONFIRM";
pub const PUBLISH_LIMIT: &str = "PUBLISH_LIMIT";

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow!("Invalid value '{}' for {}: {}", value, key, e))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("Invalid value '{}' for {}: expected a boolean", value, key)),
    }
}

/// Overrides config fields from environment variables.
///
/// `lookup` returns the value of a variable, if set. `AppConfig::load` passes
/// `std::env::var`; tests pass a map.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(uri) = lookup(AMQP_ADDR) {
        config.connection.uri = uri;
    }
    if let Some(name) = lookup(AMQP_CONNECTION_NAME) {
        config.connection.connection_name = name;
    }
    if let Some(secs) = lookup(AMQP_CONNECT_DEADLINE_SECS) {
        config.connection.connect_deadline_secs = parse_var(AMQP_CONNECT_DEADLINE_SECS, &secs)?;
    }

    if let Some(exchange) = lookup(STREAM_EXCHANGE) {
        config.topology.exchange = exchange;
    }
    if let Some(queue) = lookup(STREAM_QUEUE) {
        config.topology.queue = queue;
    }
    if let Some(key) = lookup(STREAM_ROUTING_KEY) {
        config.topology.routing_key = Some(key);
    }
    if let Some(age) = lookup(STREAM_MAX_AGE) {
        config.topology.max_age = Some(age);
    }

    if let Some(offset) = lookup(STREAM_OFFSET) {
        config.consumer.offset = offset;
    }
    if let Some(tag) = lookup(CONSUMER_TAG) {
        config.consumer.consumer_tag = tag;
    }
    if let Some(prefetch) = lookup(PREFETCH_COUNT) {
        config.consumer.prefetch_count = parse_var(PREFETCH_COUNT, &prefetch)?;
    }

    if let Some(interval) = lookup(PUBLISH_INTERVAL_MS) {
        config.publisher.interval_ms = parse_var(PUBLISH_INTERVAL_MS, &interval)?;
    }
    if let Some(payload) = lookup(PUBLISH_PAYLOAD) {
        config.publisher.payload = payload;
    }
    if let Some(confirm) = lookup(PUBLISH_CONFIRM) {
        config.publisher.confirm = parse_bool(PUBLISH_CONFIRM, &confirm)?;
    }
    if let Some(limit) = lookup(PUBLISH_LIMIT) {
        config.publisher.limit = Some(parse_var(PUBLISH_LIMIT, &limit)?);
    }

    Ok(())
}
