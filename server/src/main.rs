use std::io::BufRead;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use hyper::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tower::ServiceExt;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use server::auth::SystemClock;
use server::auth::password::hash_password;
use server::database::{CredentialStore, InMemoryCredentialStore, SqliteCredentialStore};
use server::{AppState, build_service};
use shared::config::load_config;

/// How long in-flight connections get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "portfolio-server", version, about = "Portfolio JSON API server")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "PORTFOLIO_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read a password from stdin and print its Argon2id hash for the users table
    HashPassword,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Some(Command::HashPassword) = cli.command {
        return print_password_hash();
    }

    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    let addr = config.server.addr();

    let credentials: Arc<dyn CredentialStore> = match &config.database.url {
        Some(url) => Arc::new(
            SqliteCredentialStore::connect(url)
                .await
                .context("Failed to open credential database")?,
        ),
        None => {
            warn!("No [database] url configured; no user will be able to log in");
            Arc::new(InMemoryCredentialStore::new())
        }
    };

    let state = AppState::new(config, Arc::new(SystemClock), credentials)
        .context("Failed to initialise session authentication")?;
    let service = build_service(state.clone()).context("Failed to build request pipeline")?;

    spawn_rate_limit_gc(&state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    let graceful = GracefulShutdown::new();
    let mut shutdown = std::pin::pin!(shutdown_signal());

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                };

                let svc = service.clone();
                let hyper_service = service_fn(move |mut req: Request<Incoming>| {
                    req.extensions_mut().insert::<SocketAddr>(peer);
                    svc.clone().oneshot(req)
                });

                let conn = http1::Builder::new()
                    .timer(TokioTimer::new())
                    .serve_connection(TokioIo::new(stream), hyper_service);
                let conn = graceful.watch(conn);

                tokio::spawn(async move {
                    if let Err(err) = conn.await {
                        debug!("Error serving connection from {}: {:?}", peer, err);
                    }
                });
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, draining connections");
                break;
            }
        }
    }

    drop(listener);

    tokio::select! {
        _ = graceful.shutdown() => info!("All connections closed"),
        _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
            warn!("Timed out after {:?} waiting for connections to close", SHUTDOWN_GRACE)
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_password_hash() -> Result<()> {
    let mut password = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut password)
        .context("Failed to read password from stdin")?;

    let password = password.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("Password must not be empty");
    }

    println!("{}", hash_password(password)?);
    Ok(())
}

/// Periodically drop rate-limit counters whose window (plus grace) is over.
fn spawn_rate_limit_gc(state: &AppState) {
    let limiter = state.limiter.clone();
    let interval = state.config.rate_limit.gc_interval();
    let standard = state.standard_policy();
    let strict = state.strict_policy();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match limiter.gc().await {
                Ok(0) => {}
                Ok(removed) => debug!("Rate limit GC removed {} counters", removed),
                Err(e) => warn!("Rate limit GC failed: {}", e),
            }

            if let Ok(stats) = limiter.stats(&[&standard, &strict]).await {
                debug!(
                    "Rate limiter tracking {} clients, {} currently limited",
                    stats.tracked, stats.limited
                );
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
