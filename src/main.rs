use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rabbit_stream_demo::config::{create_default_config_file, AppConfig};
use rabbit_stream_demo::rabbitmq::{
    ConnectionManager, PrintingHandler, StreamConsumer, StreamPublisher, StreamTopology,
};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = std::env::args().skip(1);
    if let Some(arg) = args.next() {
        if arg != "--write-default-config" {
            bail!("Unrecognised argument '{}'", arg);
        }
        let path = args
            .next()
            .context("--write-default-config expects a file path")?;
        create_default_config_file(Path::new(&path))?;
        println!("Configuration file created at: {}", path);
        return Ok(());
    }

    let config = AppConfig::load().context("Failed to load configuration")?;
    run(config).await
}

async fn run(config: AppConfig) -> Result<()> {
    info!(uri = %config.connection.redacted_uri(), "Starting stream demo");

    let mut manager = ConnectionManager::new(&config.connection);
    manager.connect().await?;

    let consumer_channel = manager.create_channel().await?;
    let publisher_channel = manager.create_channel().await?;

    let topology = StreamTopology::from_config(&config.topology)?;
    topology.declare(&publisher_channel).await?;

    let consumer = StreamConsumer::new(
        consumer_channel,
        &config.topology.queue,
        &config.consumer.consumer_tag,
        config.consumer.prefetch_count,
        config.consumer.stream_offset()?,
    );
    let mut consumer_task = tokio::spawn(async move { consumer.run(&PrintingHandler).await });

    let publisher = StreamPublisher::new(
        publisher_channel,
        &config.topology.exchange,
        config.topology.routing_key(),
        config.publisher.payload.as_bytes(),
        config.publisher.publish_interval(),
        config.publisher.confirm,
    );
    publisher.enable_confirms().await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Unable to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let outcome = tokio::select! {
        published = publisher.run(config.publisher.limit, shutdown) => {
            published
                .map(|(sent, stop)| info!(sent, reason = ?stop, "Publisher finished"))
                .context("Publisher failed")
        }
        consumed = &mut consumer_task => {
            match consumed {
                Ok(Ok(handled)) => {
                    warn!(handled, "Consumer stopped before the publisher");
                    Ok(())
                }
                Ok(Err(e)) => Err(e).context("Consumer failed"),
                Err(e) => Err(e).context("Consumer task panicked"),
            }
        }
    };

    consumer_task.abort();
    manager.close().await?;
    info!("Shutdown complete");
    outcome
}
