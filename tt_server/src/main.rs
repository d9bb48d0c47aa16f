//! Todo tracker API server.
//!
//! Loads configuration, connects the store, builds the router and serves it
//! until Ctrl-C or SIGTERM, then drains background email tasks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Error};
use pico_args::Arguments;
use tokio::sync::watch;
use todo_tracker::{
    db::{Database, Store},
    mailer::LogMailer,
};
use tt_server::{
    api::{self, AppState},
    config::{ConfigOverrides, ServerConfig},
    logging, metrics, shutdown,
};

const HELP: &str = "\
Run the todo tracker API server

USAGE:
  tt_server [OPTIONS]

OPTIONS:
  --port                  PORT    API server port               [default: env PORT or 4000]
  --env                   ENV     development|staging|production [default: env APP_ENV or development]
  --db-dsn                URL     PostgreSQL DSN                [default: env DATABASE_URL]
  --limiter-rps           N       Rate limiter tokens per second [default: env LIMITER_RPS or 2]
  --limiter-burst         N       Rate limiter bucket size      [default: env LIMITER_BURST or 4]
  --cors-trusted-origins  LIST    Space separated trusted origins

FLAGS:
  --in-memory                     Use the in-process store instead of PostgreSQL
  --limiter-disabled              Turn rate limiting off
  --metrics                       Serve Prometheus metrics at /debug/vars
  -h, --help                      Print help information

ENVIRONMENT:
  PASSWORD_PEPPER                 Password hashing pepper (required in production)
  RUST_LOG                        Log filter [default: info,sqlx=warn,hyper=warn]
  (See .env.example for all configuration options)
";

/// How long shutdown waits for in-flight requests, and then for background
/// tasks
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

fn parse_args() -> Result<ConfigOverrides, Error> {
    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let overrides = ConfigOverrides {
        port: pargs.opt_value_from_str("--port")?,
        env: pargs.opt_value_from_str("--env")?,
        database_url: pargs.opt_value_from_str("--db-dsn")?,
        in_memory: pargs.contains("--in-memory"),
        limiter_rps: pargs.opt_value_from_str("--limiter-rps")?,
        limiter_burst: pargs.opt_value_from_str("--limiter-burst")?,
        limiter_disabled: pargs.contains("--limiter-disabled"),
        cors_trusted_origins: pargs.opt_value_from_str("--cors-trusted-origins")?,
        metrics: pargs.contains("--metrics"),
    };

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        anyhow::bail!("unexpected arguments: {remaining:?}");
    }
    Ok(overrides)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let overrides = parse_args()?;
    logging::init();

    let config = ServerConfig::from_env(overrides).context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    tracing::info!(env = %config.env, port = config.port, "starting todo tracker server");

    let (store, database) = if config.in_memory {
        tracing::warn!("using the in-memory store; data is lost on exit");
        (Store::in_memory(), None)
    } else {
        tracing::info!("connecting to database");
        let db = Database::new(&config.database)
            .await
            .context("failed to connect to database")?;
        db.migrate().await.context("failed to run migrations")?;
        tracing::info!("database connection pool established");

        let store = Store::postgres(db.pool().clone(), config.database.query_timeout);
        (store, Some(db))
    };

    let mut state = AppState::new(
        store,
        config.password_pepper.clone(),
        Arc::new(LogMailer::new(config.smtp_sender.clone())),
        config.limiter,
        config.env,
        config.cors_trusted_origins.clone(),
    );

    if config.metrics {
        let handle = metrics::install_recorder().context("failed to install metrics recorder")?;
        state = state.with_metrics(handle);
    }

    let sweeper = state.limiter.enabled().then(|| state.limiter.spawn_sweeper());
    let tasks = state.tasks.clone();
    let app = api::create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    tracing::info!(%addr, "server is listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown::signal().await;
        let _ = shutdown_tx.send(true);
    });

    match shutdown::drain_with_deadline(server, shutdown_rx, SHUTDOWN_TIMEOUT).await {
        Some(result) => result.context("server error")?,
        None => tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "in-flight requests still running at shutdown timeout; forcing exit"
        ),
    }

    tracing::info!(running = tasks.running(), "completing background tasks");
    if !tasks.wait_timeout(SHUTDOWN_TIMEOUT).await {
        tracing::warn!(
            running = tasks.running(),
            "background tasks still running at shutdown timeout"
        );
    }

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    if let Some(db) = database {
        db.close().await;
    }

    tracing::info!("stopped server");
    Ok(())
}
