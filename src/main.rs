use std::sync::Arc;

use fleet_agent::cdc::heartbeat_store;
use fleet_agent::coordination::connector_for;
use fleet_agent::exec::ShellRunner;
use fleet_agent::file_io::open_file_for_append;
use fleet_agent::Agent;
use fleet_agent::CdcCollector;
use fleet_agent::Error;
use fleet_agent::LoggingConfig;
use fleet_agent::Result;
use fleet_agent::Settings;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("fleet-agent stopped: {e}");
    }
    println!("Exiting program.");
    std::process::exit(0);
}

async fn run() -> Result<()> {
    let settings = Settings::new()?.validate()?;

    // Initializing Logs
    let _guard = init_observability(&settings.logging)?;
    info!("starting with {settings:?}");

    // Initializing Shutdown Signal
    let (graceful_tx, mut graceful_rx) = watch::channel(());
    let shutdown = CancellationToken::new();
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });
    let token = shutdown.clone();
    tokio::spawn(async move {
        if graceful_rx.changed().await.is_ok() {
            token.cancel();
        }
    });

    let connector = connector_for(&settings.coordination);
    if settings.coordination.embedded {
        info!("running against an embedded coordination tree");
    }

    let collector = if settings.collector.enabled {
        let store = heartbeat_store(&settings.collector)?;
        let collector = CdcCollector::start(
            connector.clone(),
            &settings.coordination,
            store,
            settings.collector.heartbeat_interval(),
        )
        .await?;
        Some(tokio::spawn(collector.run(shutdown.clone())))
    } else {
        None
    };

    let result = if settings.agent.enabled {
        let agent = Agent::start(connector, &settings, Arc::new(ShellRunner::new())).await?;
        info!("Application started. Waiting for CTRL+C signal...");
        let result = agent.run(shutdown.clone()).await;
        if let Err(e) = &result {
            error!("agent stops: {:?}", e);
        }
        result
    } else {
        info!("collector only. Waiting for CTRL+C signal...");
        Ok(())
    };

    // an agent that stops ends the collector too
    if settings.agent.enabled {
        shutdown.cancel();
    }
    let collected = match collector {
        Some(collector) => match collector.await {
            Ok(Err(e)) => {
                error!("collector stops: {:?}", e);
                Err(e)
            }
            Err(e) => {
                error!("collector task failed: {:?}", e);
                Err(e.into())
            }
            Ok(Ok(())) => Ok(()),
        },
        None => Ok(()),
    };
    shutdown.cancel();
    result.and(collected)
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::SignalSenderClosed(format!("Failed to send shutdown signal: {}", e))
    })?;

    info!("Shutdown completed");
    Ok(())
}

pub fn init_observability(config: &LoggingConfig) -> Result<WorkerGuard> {
    let log_file = open_file_for_append(&config.log_file())?;

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
