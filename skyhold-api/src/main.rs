use skyhold_api::{app, AppState};
use skyhold_booking::SimulatedGateway;
use skyhold_catalog::InMemoryCatalog;
use skyhold_core::SystemClock;
use skyhold_store::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skyhold_api=debug,skyhold_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!("Starting Skyhold API on port {}", config.server.port);

    // Flight catalog
    let catalog = match &config.catalog.seed_path {
        Some(path) => {
            tracing::info!(path = %path, "Loading flight catalog");
            InMemoryCatalog::load(path)?
        }
        None => {
            tracing::info!("No seed file configured, using the demo schedule");
            InMemoryCatalog::demo()
        }
    };

    // Payment gateway
    let gateway = Arc::new(SimulatedGateway::new(
        config.payment.decline_rate,
        config.payment.simulated_latency(),
    ));

    let state = AppState::new(Arc::new(catalog), gateway, Arc::new(SystemClock), &config)?;

    // Background workers
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = state.reaper.clone().start(shutdown_rx);
    state.metrics.clone().spawn_recorder(state.bookings.subscribe());
    start_event_forwarding(&config, &state)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    let _ = shutdown_tx.send(true);
    reaper.await?;
    Ok(())
}

#[cfg(feature = "kafka")]
fn start_event_forwarding(config: &Config, state: &AppState) -> anyhow::Result<()> {
    if let Some(kafka) = &config.kafka {
        let producer = skyhold_store::EventProducer::new(&kafka.brokers)?;
        producer.forward(state.bookings.subscribe(), kafka.topic_prefix.clone());
        tracing::info!(brokers = %kafka.brokers, prefix = %kafka.topic_prefix, "Forwarding lifecycle events to Kafka");
    }
    Ok(())
}

#[cfg(not(feature = "kafka"))]
fn start_event_forwarding(config: &Config, _state: &AppState) -> anyhow::Result<()> {
    if config.kafka.is_some() {
        tracing::warn!("Kafka is configured but this build lacks the `kafka` feature; events stay in-process");
    }
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (Ok(mut sigterm), Ok(mut sigquit)) = (signal(SignalKind::terminate()), signal(SignalKind::quit())) else {
        tracing::warn!("Could not install signal handlers, falling back to Ctrl-C");
        let _ = tokio::signal::ctrl_c().await;
        return;
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
