use anyhow::{Context, Result};
use std::sync::Arc;

use token_keeper::auth::{AddressBar, MemoryHistory, RefreshClient, Session, SessionManager, SqliteStore};
use token_keeper::config::{Config, RunMode};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("Token Keeper starting...");
    tracing::debug!(?config, "Configuration loaded");

    let store = Arc::new(SqliteStore::open(&config.db_file)?);
    tracing::info!("Session store: {}", config.db_file.display());

    let refresher = Arc::new(RefreshClient::new(
        config.refresh_url.clone(),
        config.http_connect_timeout,
        config.http_request_timeout,
    )?);
    let refresh_endpoint = refresher.endpoint().to_string();

    if config.mode == RunMode::Logout {
        let manager = SessionManager::new(store, refresher, config.refresh_lead_secs)?;
        manager.logout()?;
        manager.shutdown();
        println!("Session cleared");
        return Ok(());
    }

    let address = MemoryHistory::parse(&config.location)
        .with_context(|| format!("Invalid location: {}", config.location))?;
    let manager = SessionManager::bootstrap(store, refresher, &address, config.refresh_lead_secs)?;

    print_session(&manager.session(), &address.current().to_string());

    if config.mode == RunMode::Once {
        manager.shutdown();
        return Ok(());
    }

    tracing::info!("Watching session (refresh endpoint: {})", refresh_endpoint);
    let mut sessions = manager.subscribe();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = sessions.changed() => {
                if changed.is_err() {
                    break;
                }
                let session = sessions.borrow_and_update().clone();
                if session.is_authenticated() {
                    tracing::info!(email = ?session.email, "Session refreshed");
                } else {
                    tracing::warn!("Session ended, login required");
                }
            }
            _ = &mut shutdown => {
                break;
            }
        }
    }

    manager.shutdown();
    tracing::info!("Token Keeper stopped");

    Ok(())
}

/// Print a short session summary
fn print_session(session: &Session, location: &str) {
    println!();
    println!("  Location:      {}", location);
    println!(
        "  Authenticated: {}",
        if session.is_authenticated() { "yes" } else { "no" }
    );
    println!(
        "  Email:         {}",
        session.email.as_deref().unwrap_or("-")
    );
    println!("  Name:          {}", session.name.as_deref().unwrap_or("-"));
    println!();
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, shutting down...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down...");
        },
    }
}
