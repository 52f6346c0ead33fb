//! Courier notification pipeline server

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use courier_connectors::broker::BrokerClient;
use courier_connectors::push::{PushBridge, Relay, WebSocketTransport};
use courier_connectors::store::{NotificationStoreClient, StatsSource};
use courier_connectors::HealthStatus;
use courier_core::DEFAULT_FEED_CAPACITY;
use courier_server::{broker_health, HealthReport, LiveStats, Settings};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Courier - real-time notification pipeline
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "courier.toml")]
    config: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Seconds between health reports
    #[arg(long, default_value_t = 30)]
    health_interval: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Republish broker events on the push topic
    Relay,

    /// Follow the push topic and keep live counters
    Watch {
        /// Only count notifications for this recipient
        #[arg(long)]
        recipient: Option<String>,

        /// Number of notifications kept in the feed
        #[arg(long, default_value_t = DEFAULT_FEED_CAPACITY)]
        feed_size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    let level = &args.log_level;
                    format!("courier={level},courier_server={level},courier_connectors={level}")
                        .into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Courier");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", args.config);

    let settings = Settings::load(&args.config)
        .with_context(|| format!("loading settings from {}", args.config))?;
    let health_interval = Duration::from_secs(args.health_interval.max(1));

    match args.command {
        Command::Relay => run_relay(&settings, health_interval).await,
        Command::Watch {
            recipient,
            feed_size,
        } => run_watch(&settings, recipient, feed_size, health_interval).await,
    }
}

async fn run_relay(settings: &Settings, health_interval: Duration) -> Result<()> {
    let broker_config = settings.broker()?;
    let push_config = settings.push()?;
    let topic = push_config.topic.clone();

    let client = Arc::new(BrokerClient::kafka(broker_config));
    if let Err(e) = client.connect().await {
        // The relay only needs the consumer; a producer failure is survivable.
        if !client.status().consumer {
            client.disconnect().await;
            return Err(e).context("connecting broker consumer");
        }
        warn!(error = %e, "broker partially connected");
    }

    let (tx, rx) = mpsc::channel(1024);
    let consumer = client.spawn_consumer(tx)?;

    let reporter = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(health_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = HealthReport::new().with("broker", broker_health(&client.status()));
                log_health(&report);
                let m = client.metrics().snapshot();
                info!(
                    received = m.messages_received,
                    receive_errors = m.receive_errors,
                    "broker counters"
                );
            }
        })
    };

    let transport = WebSocketTransport::connect(&push_config);
    let relay = Relay::new(transport, topic);
    let relay_metrics = relay.metrics();
    relay.run(rx, shutdown_signal()).await;

    reporter.abort();
    client.disconnect().await;
    if let Err(e) = consumer.await {
        warn!(error = %e, "broker consumer task failed");
    }

    let m = relay_metrics.snapshot();
    info!(
        relayed = m.events_dispatched,
        malformed = m.malformed_dropped,
        failures = m.relay_failures,
        "relay finished"
    );
    log_health(&HealthReport::new().with("broker", broker_health(&client.status())));
    Ok(())
}

async fn run_watch(
    settings: &Settings,
    recipient: Option<String>,
    feed_size: usize,
    health_interval: Duration,
) -> Result<()> {
    let push_config = settings.push()?;
    let source: Option<Arc<dyn StatsSource>> = match settings.store()? {
        Some(cfg) => Some(Arc::new(NotificationStoreClient::new(cfg)?)),
        None => {
            warn!("no [store] section, live stats start from zero and are never resynced");
            None
        }
    };

    let live = Arc::new(LiveStats::new(source, recipient, feed_size));
    let bridge = PushBridge::new(push_config.clone());
    let transport = WebSocketTransport::connect(&push_config);
    let handle = Arc::clone(&live)
        .start(&bridge, transport, push_config.topic.clone())
        .await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(health_interval);
    let subscription_ended = loop {
        tokio::select! {
            () = &mut shutdown => break false,
            () = handle.closed() => break true,
            _ = ticker.tick() => {
                let stats = live.snapshot();
                info!(
                    total = stats.total,
                    unread = stats.unread,
                    read = stats.read,
                    sent = stats.sent,
                    pending = stats.pending,
                    "live stats"
                );
                log_health(&HealthReport::new().with("push", handle.health()));
            }
        }
    };

    let final_health = HealthReport::new().with("push", handle.health());
    handle.stop().await;
    let m = bridge.metrics().snapshot();
    info!(
        dispatched = m.events_dispatched,
        malformed = m.malformed_dropped,
        resubscriptions = m.resubscriptions,
        "watch finished"
    );
    log_health(&final_health);
    if subscription_ended {
        bail!("push subscription to {} closed", push_config.topic);
    }
    Ok(())
}

fn log_health(report: &HealthReport) {
    match report.overall() {
        HealthStatus::Healthy | HealthStatus::Unknown => info!(health = %report, "health"),
        HealthStatus::Degraded(_) | HealthStatus::Unhealthy(_) => {
            warn!(health = %report, "health");
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
