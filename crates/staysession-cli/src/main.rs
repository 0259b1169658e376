//! staysession - inspect and manage the locally persisted booking session.
//!
//! The CLI drives the same session cache the front end uses, against the
//! durable and ephemeral backends selected in the config file.

use std::io;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use staysession_core::api::ApiClient;
use staysession_core::auth::{expiry, token};
use staysession_core::storage::KeyPresence;
use staysession_core::{Config, Principal, SessionCache};

// ============================================================================
// Constants
// ============================================================================

/// Environment variable overriding the configured API base URL
const API_URL_ENV: &str = "STAYSESSION_API_URL";

/// When set, logs are also written to a daily rolling file in this directory
const LOG_DIR_ENV: &str = "STAYSESSION_LOG_DIR";

const USAGE: &str = "\
Usage: staysession <command>

Commands:
  status                                  Show session state and storage presence
  whoami                                  Show the current principal
  inspect <token>                         Decode a credential's claims (no verification)
  login <principal-json> <access> [refresh]
                                          Store credentials obtained elsewhere
  logout                                  Clear the session from every backend
  refresh                                 Exchange the refresh credential for a new access credential
  init-config                             Write a default config file";

/// Initialize the tracing subscriber for logging.
/// The returned guard must live until exit so buffered file logs are flushed.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "staysession.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    if command == "inspect" {
        let token = args.get(1).context("inspect requires a token argument")?;
        return inspect(token);
    }
    if command == "init-config" {
        return init_config();
    }

    let config = Config::load().context("Failed to load config")?;
    debug!(backend = ?config.durable_backend, "Config loaded");

    let store = config.session_store()?;
    let session = SessionCache::start(store, config.refresh_lookahead_secs);
    info!(state = %session.state(), "Session initialized");

    match command.as_str() {
        "status" => status(&session),
        "whoami" => whoami(&session),
        "login" => login(&session, &args[1..]),
        "logout" => {
            session.logout();
            println!("Logged out.");
            Ok(())
        }
        "refresh" => refresh(&config, &session).await,
        other => {
            eprintln!("{}", USAGE);
            bail!("Unknown command: {}", other)
        }
    }
}

fn presence_line(label: &str, presence: &KeyPresence) -> String {
    let mark = |present: bool| if present { "yes" } else { "no" };
    format!(
        "{:<10} principal: {:<4} access: {:<4} refresh: {}",
        label,
        mark(presence.principal),
        mark(presence.access_credential),
        mark(presence.refresh_credential)
    )
}

fn status(session: &SessionCache) -> Result<()> {
    println!("State:     {}", session.state());
    if let Some(principal) = session.principal() {
        println!("Principal: {} ({})", principal.display_name(), principal.display_id());
        let remaining = session.time_until_expiry();
        println!("Expires:   in {}m {}s", remaining / 60, remaining % 60);
        if session.needs_refresh() {
            println!("           refresh recommended");
        }
    }

    let store = session.store_status();
    println!();
    println!("{}", presence_line("durable", &store.durable));
    println!("{}", presence_line("ephemeral", &store.ephemeral));
    Ok(())
}

fn whoami(session: &SessionCache) -> Result<()> {
    match session.principal() {
        Some(principal) => {
            println!("{}", serde_json::to_string_pretty(&principal)?);
            Ok(())
        }
        None => bail!("Not logged in"),
    }
}

fn inspect(raw: &str) -> Result<()> {
    let claims = token::decode(raw).context("Failed to decode credential")?;
    println!("{}", serde_json::to_string_pretty(&claims)?);

    let claims = Some(&claims);
    if expiry::is_expired(claims) {
        println!("\nExpired.");
    } else {
        let remaining = expiry::time_until_expiry(claims);
        println!("\nValid for {}m {}s (unverified).", remaining / 60, remaining % 60);
    }
    Ok(())
}

fn login(session: &SessionCache, args: &[String]) -> Result<()> {
    let principal_json = args.first().context("login requires a principal JSON argument")?;
    let access = args.get(1).context("login requires an access credential")?;
    let refresh = args.get(2).cloned();

    let principal: Principal =
        serde_json::from_str(principal_json).context("Principal is not valid JSON")?;

    if expiry::is_token_expired(access) {
        eprintln!("Warning: access credential is expired or undecodable; it will be discarded on next start.");
    }

    session.login(Some(principal), access, refresh)?;
    println!("Logged in as {}.", session.principal().map(|p| p.display_name()).unwrap_or_default());

    let store = session.store_status();
    if !store.durable.access_credential || !store.ephemeral.access_credential {
        eprintln!("Warning: session was not persisted to every backend.");
    }
    Ok(())
}

async fn refresh(config: &Config, session: &SessionCache) -> Result<()> {
    let base_url = std::env::var(API_URL_ENV)
        .ok()
        .or_else(|| config.api_base_url.clone())
        .with_context(|| format!("No API URL configured; set {} or api_base_url", API_URL_ENV))?;

    if !session.is_authenticated() {
        bail!("Not logged in");
    }

    let client = ApiClient::new(&base_url, session.clone())?;
    client.refresh().await?;

    println!("Refreshed. Expires in {}s.", session.time_until_expiry());
    Ok(())
}

fn init_config() -> Result<()> {
    let path = Config::config_path()?;
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    Config::default().save()?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
