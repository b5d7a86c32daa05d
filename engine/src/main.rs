use radio24::api::{build_router, AppState};
use radio24::clock::SystemClock;
use radio24::config::{EngineConfig, OutputKind};
use radio24::output::{AudioOutput, RemoteOutput, SimulatedOutput};
use radio24::playout::{self, Playout, PlayoutCommand};
use radio24::store::SqliteStore;
use std::sync::Arc;
use tracing::{info, warn};

// radio24 engine
//
// One process, three moving parts:
//   - the playout task, which decides what is on air
//   - the SQLite catalog it draws content from
//   - the HTTP API players and the admin panel talk to
//
// Bind loopback by default and put a reverse proxy in front for public access.

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Read the local offset while still single-threaded.
    let clock = SystemClock::local();
    info!("wall clock offset: {:?}", clock.offset());

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(clock))
}

async fn run(clock: SystemClock) -> anyhow::Result<()> {
    let version = env!("CARGO_PKG_VERSION").to_string();
    let cfg = EngineConfig::from_env()?;

    let store = Arc::new(SqliteStore::open(&cfg.db_path, cfg.listener_window)?);

    // Output events flow into the playout task. The remote output never sends
    // on this channel itself; browsers report through the API instead.
    let (events_tx, events_rx) = tokio::sync::mpsc::channel(32);
    let output: Arc<dyn AudioOutput> = match cfg.output {
        OutputKind::Remote => Arc::new(RemoteOutput::new()),
        OutputKind::Simulated => Arc::new(SimulatedOutput::new(events_tx.clone())),
    };
    info!("output: {:?}", cfg.output);

    let controller = Playout::new(store.clone(), output, Arc::new(clock), cfg.playout());
    let (handle, playout_task) = playout::spawn(controller, events_tx, events_rx);

    if cfg.autoplay {
        handle.send(PlayoutCommand::Play).await?;
    }

    let app = build_router(AppState { version: version.clone(), playout: handle.clone(), store });

    info!("radio24 engine v{version} starting on http://{}", cfg.bind);

    let listener = tokio::net::TcpListener::bind(cfg.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = handle.send(PlayoutCommand::Shutdown).await {
        warn!("{e}");
    }
    playout_task.await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let term = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let term = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = term => {},
    }

    warn!("Shutdown signal received.");
}
