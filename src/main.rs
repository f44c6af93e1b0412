use std::net::SocketAddr;

use anyhow::{Context, Result};
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cf_dashboard::settings::{Settings, VarSet};
use cf_dashboard::web::{AppState, router};

const PORT_ENV: &str = "PORT";
const DEFAULT_PORT: u64 = 9999;

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine; real deployments use the environment or VCAP_SERVICES.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cf_dashboard=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let vars = VarSet::from_process_env()
        .inspect_err(|e| tracing::error!(error = %e, "Invalid configuration sources"))
        .context("reading configuration sources")?;
    let settings = Settings::load(&vars)
        .inspect_err(|e| tracing::error!(error = %e, "Invalid configuration"))
        .context("loading settings")?;

    let port = u16::try_from(vars.u64(PORT_ENV, DEFAULT_PORT)?)
        .with_context(|| format!("{PORT_ENV} is not a valid port"))?;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(
        build_info = %settings.build_info,
        uaa = %settings.uaa_url,
        local_cf = settings.local_cf,
        request_timeout = ?settings.request_timeout(),
        "Starting dashboard"
    );
    if settings.pprof_enabled {
        tracing::info!("Profiling requested; no profiler endpoints are mounted by this build");
    }

    let state = AppState::new(settings).context("initializing application state")?;

    let app = router(state).layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Graceful shutdown initiated");
}
