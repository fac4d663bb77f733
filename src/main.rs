// src/main.rs - Agent binary running against the simulated printer
use autodrop_agent::actions::ShellAction;
use autodrop_agent::config;
use autodrop_agent::connection::spawn_connectivity_monitor;
use autodrop_agent::file_manager::DiskStaging;
use autodrop_agent::settings::FileSettings;
use autodrop_agent::snapshot::HttpSnapshot;
use autodrop_agent::web::{AppStateInner, auth::JwtKeys, create_router};
use autodrop_agent::{Agent, AgentDeps};
use autodrop_shared::PrinterEvent;
use clap::Parser;
use printer_sim::SimulatedPrinter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Parser, Debug)]
#[command(name = "autodrop-agent", version, about = "Autodrop3D printer agent")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "autodrop.toml")]
    config: String,
    /// Override the control API bind address
    #[arg(long)]
    bind: Option<String>,
    /// Maximum log level
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_max_level(cli.log_level).init();

    tracing::info!("Starting Autodrop3D agent {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Loading configuration from: {}", cli.config);
    let config = config::load_config(&cli.config).map_err(|e| {
        tracing::error!("Please ensure the configuration file exists and is properly formatted");
        Box::new(e) as BoxError
    })?;
    tracing::info!("Printer: {} -> {}", config.autodrop.name, config.autodrop.server);

    // Device lifecycle events and connectivity changes share one channel into the agent.
    let (events_tx, events_rx) = mpsc::unbounded_channel::<PrinterEvent>();
    let printer = Arc::new(
        SimulatedPrinter::new()
            .with_files_root(&config.storage.uploads)
            .with_events(events_tx.clone()),
    );

    let agent = Agent::spawn(AgentDeps {
        device: printer.clone(),
        staging: Arc::new(DiskStaging::new(&config.storage.uploads)),
        camera: Arc::new(HttpSnapshot),
        settings: Arc::new(FileSettings::new(&cli.config)),
        actions: Arc::new(ShellAction::default()),
    })?;
    printer.set_hooks(agent.interceptor());
    let forwarder = agent.forward_events(events_rx);
    agent.dispatch(PrinterEvent::Startup).await?;

    let clock = printer.clone().spawn_clock(Duration::from_millis(50));
    let monitor_tx = events_tx.clone();
    let monitor = spawn_connectivity_monitor(config.online_check.clone(), move |event| {
        let _ = monitor_tx.send(event);
    });
    printer.connect();

    let state = AppStateInner::new(agent.clone(), JwtKeys::from_env(config.web.jwt_expiration));
    let app = create_router(state);
    let bind = cli.bind.unwrap_or_else(|| config.web.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("Control API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    monitor.abort();
    clock.abort();
    printer.disconnect();
    agent.shutdown().await;
    forwarder.abort();
    Ok(())
}
