use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use url::Url;

use crate::auth::DEFAULT_REFRESH_LEAD_SECS;

/// Default location of the session database
const DEFAULT_DB_FILE: &str = "~/.local/share/token-keeper/session.sqlite3";

/// Address used when no location is given
const DEFAULT_LOCATION: &str = "http://localhost/";

/// Token Keeper - session token lifecycle manager
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to the SQLite session store
    #[arg(short = 'd', long, env = "TOKEN_KEEPER_DB_FILE", default_value = DEFAULT_DB_FILE)]
    pub db_file: String,

    /// Refresh endpoint URL
    #[arg(
        short = 'u',
        long,
        env = "REFRESH_URL",
        default_value = "http://localhost:8080/auth/refresh"
    )]
    pub refresh_url: String,

    /// Application address to bootstrap from (may carry a login handoff)
    #[arg(short = 'l', long, env = "APP_LOCATION")]
    pub location: Option<String>,

    /// Seconds before expiry at which the access token is refreshed
    #[arg(long, env = "REFRESH_LEAD_SECS", default_value_t = DEFAULT_REFRESH_LEAD_SECS)]
    pub refresh_lead: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Clear the stored session and exit
    #[arg(long)]
    pub logout: bool,

    /// Print the session after bootstrap and exit
    #[arg(long)]
    pub once: bool,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Storage
    pub db_file: PathBuf,

    // Refresh endpoint
    pub refresh_url: String,
    pub refresh_lead_secs: u64,

    // Bootstrap
    pub location: String,

    // HTTP client
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Logging
    pub log_level: String,

    // Run mode
    pub mode: RunMode,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RunMode {
    /// Keep the session fresh until interrupted
    Watch,
    /// Bootstrap, print, exit
    Once,
    /// Clear the session, exit
    Logout,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_args(CliArgs::parse())
    }

    /// Build configuration from parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let mode = if args.logout {
            RunMode::Logout
        } else if args.once {
            RunMode::Once
        } else {
            RunMode::Watch
        };

        Ok(Config {
            db_file: expand_tilde(&args.db_file),
            refresh_url: args.refresh_url,
            refresh_lead_secs: args.refresh_lead,
            location: args
                .location
                .unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            http_request_timeout: args.http_timeout,
            log_level: args.log_level,
            mode,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let refresh_url = Url::parse(&self.refresh_url)
            .with_context(|| format!("REFRESH_URL is not a valid URL: {}", self.refresh_url))?;
        if !matches!(refresh_url.scheme(), "http" | "https") {
            anyhow::bail!("REFRESH_URL must use http or https: {}", self.refresh_url);
        }

        Url::parse(&self.location)
            .with_context(|| format!("APP_LOCATION is not a valid URL: {}", self.location))?;

        if self.http_request_timeout == 0 {
            anyhow::bail!("HTTP_REQUEST_TIMEOUT must be greater than zero");
        }

        Ok(())
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
