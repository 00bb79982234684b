use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use taskmq_core::impls::{AmqpDeliveryQueue, MySqlConnectionProvider};
use taskmq_core::ports::DeliveryQueue;
use taskmq_core::{AppConfig, Consumer, TaskKind, TaskRegistry, parse_params};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "taskmq")]
#[command(about = "Consume task messages from a queue and dispatch them to handlers", long_about = None)]
struct Args {
    /// Task to run, e.g. inventoryStaticticsMain
    #[arg(short, long)]
    task: String,

    /// Task parameters as space separated key=value pairs
    #[arg(short, long, default_value = "")]
    params: String,

    /// Path to configuration file (default: $TASKMQ_HOME/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Queue to consume; overrides config and the task default
    #[arg(long)]
    queue: Option<String>,

    /// Settle a single delivery and exit with the handler status
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let params = parse_params(&args.params);
    info!(task = %args.task, ?params, "starting");

    let task: TaskKind = match args.task.parse() {
        Ok(task) => task,
        Err(e) => {
            error!(error = %e, "refusing to start");
            return Ok(ExitCode::FAILURE);
        }
    };

    let config = AppConfig::load(args.config.as_deref()).context("loading configuration")?;
    let queue_name = args
        .queue
        .or_else(|| config.consumer.queue.clone())
        .unwrap_or_else(|| task.default_queue().to_string());

    let provider = MySqlConnectionProvider::connect_lazy(&config.database);
    let queue = AmqpDeliveryQueue::connect(&config.broker, &queue_name)
        .await
        .with_context(|| format!("subscribing to {queue_name}"))?;

    let registry = TaskRegistry::with_defaults();
    let mut consumer = Consumer::new(queue, provider, &registry, task)
        .with_malformed_policy(config.consumer.malformed);
    info!(registered = ?registry.registered_types(), queue = %queue_name, "handlers ready");

    let exit = if args.once {
        match consumer.run_once().await {
            Ok(Some(outcome)) => {
                info!(?outcome, "delivery settled");
                ExitCode::from(u8::try_from(outcome.exit_code()).unwrap_or(1))
            }
            Ok(None) => {
                warn!("subscription closed before a delivery arrived");
                ExitCode::FAILURE
            }
            Err(e) => {
                error!(error = %e, "delivery failed");
                ExitCode::FAILURE
            }
        }
    } else {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for ctrl-c; stop the process to shut down");
                // dropping the sender would stop the consumer
                std::future::pending::<()>().await;
            }
            info!("received shutdown signal");
            // receiver gone means the consumer already stopped
            let _ = shutdown_tx.send(true);
        });

        let broker = &config.broker;
        let name = queue_name.as_str();
        let reconnect = move || AmqpDeliveryQueue::connect(broker, name);
        match consumer
            .run_with_reconnect(shutdown_rx, &config.consumer.reconnect, reconnect)
            .await
        {
            Ok(()) => ExitCode::SUCCESS,
            Err(_) => ExitCode::FAILURE,
        }
    };

    let (mut queue, provider) = consumer.into_parts();
    queue.close().await;
    provider.close().await;
    Ok(exit)
}
