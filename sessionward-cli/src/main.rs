//! Sessionward CLI
//!
//! Command-line client for a token-authenticated service. The session is
//! persisted between invocations, so `login` once and later commands reuse
//! (and renew) it.
//!
//! # Usage
//!
//! ```bash
//! # Log in (prompts for the password)
//! sessionward login --email kim@example.com
//!
//! # Show the stored session
//! sessionward status
//!
//! # Call an authenticated endpoint
//! sessionward get orders/42
//!
//! # End the session
//! sessionward logout
//! ```

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use sessionward_core::{ApiClient, LogListener, RequestError, SessionManager};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt};

mod config;

#[derive(Parser)]
#[command(name = "sessionward")]
#[command(about = "Session-aware client for token-authenticated APIs")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the service, overriding the configuration file
    #[arg(long, global = true, env = "SESSIONWARD_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Password (read from stdin when omitted)
        #[arg(long, env = "SESSIONWARD_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Revoke the session and remove stored credentials
    Logout,

    /// Show the stored session
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Renew the session now
    Renew,

    /// Print a valid access token, renewing first if it has expired
    Token,

    /// Fetch the logged-in user's profile from the server
    Me,

    /// GET an authenticated endpoint and print the JSON response
    Get {
        /// Path below the base URL (e.g., orders/42)
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let loaded = config::load_config(cli.config.as_deref(), cli.base_url.as_deref())?;
    debug!(
        "Using configuration from {:?} (file present: {})",
        loaded.config_path, loaded.from_file
    );
    let config = loaded.session;

    let session = SessionManager::from_config(&config, Arc::new(LogListener))
        .await
        .context("Failed to open session storage")?;
    let session = Arc::new(session);

    match cli.command {
        Commands::Login { email, password } => login(&session, &email, password).await,
        Commands::Logout => logout(&session).await,
        Commands::Status { format } => status(&session, &format),
        Commands::Renew => renew(&session).await,
        Commands::Token => token(&session).await,
        Commands::Me => {
            let client = ApiClient::new(Arc::clone(&session), &config)?;
            me(&client).await
        }
        Commands::Get { path } => {
            let client = ApiClient::new(Arc::clone(&session), &config)?;
            get(&client, &path).await
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn login(session: &SessionManager, email: &str, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => read_password()?,
    };

    let user = session
        .login(email, &password)
        .await
        .context("Login failed")?;

    println!("Logged in as {} <{}>", user.display_name(), user.email);
    Ok(())
}

fn read_password() -> Result<String> {
    eprint!("Password: ");
    std::io::stderr().flush()?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password")?;

    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("No password given");
    }
    Ok(password)
}

async fn logout(session: &SessionManager) -> Result<()> {
    if !session.is_logged_in() {
        println!("Not logged in");
        return Ok(());
    }
    session.logout().await.context("Logout failed")?;
    println!("Logged out");
    Ok(())
}

fn status(session: &SessionManager, format: &str) -> Result<()> {
    let user = session.user();
    let expires_at = session.expires_at();
    let expired = session
        .access_token()
        .map(|token| sessionward_core::expiry::is_expired(token.expose(), Utc::now()));

    match format {
        "json" => {
            let status = serde_json::json!({
                "logged_in": session.is_logged_in(),
                "user": user,
                "expires_at": expires_at,
                "expired": expired,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        "text" => {
            if !session.is_logged_in() {
                println!("Not logged in");
                return Ok(());
            }
            match &user {
                Some(user) => println!("Logged in as {} <{}>", user.display_name(), user.email),
                None => println!("Logged in"),
            }
            match expires_at {
                Some(at) if expired == Some(true) => println!("  Access token expired at {}", at),
                Some(at) => println!("  Access token valid until {}", at),
                None => println!("  Access token expiry unknown (will renew before use)"),
            }
        }
        other => bail!("Unknown format {:?} (expected text or json)", other),
    }
    Ok(())
}

async fn renew(session: &SessionManager) -> Result<()> {
    session.renew().await.context("Renewal failed, log in again")?;
    match session.expires_at() {
        Some(at) => println!("Session renewed, access token valid until {}", at),
        None => println!("Session renewed"),
    }
    Ok(())
}

async fn token(session: &SessionManager) -> Result<()> {
    let token = session
        .ensure_access_token(Utc::now())
        .await
        .context("No usable access token")?;
    println!("{}", token.expose());
    Ok(())
}

async fn me(client: &ApiClient) -> Result<()> {
    let user = client.current_user().await.map_err(explain)?;

    println!("{} <{}>", user.display_name(), user.email);
    println!("  Id: {}", user.id);
    if let Some(role) = &user.role {
        println!("  Role: {}", role);
    }
    if let Some(status) = &user.status {
        println!("  Status: {}", status);
    }
    if let Some(last_login_at) = &user.last_login_at {
        println!("  Last login: {}", last_login_at);
    }
    Ok(())
}

async fn get(client: &ApiClient, path: &str) -> Result<()> {
    let body: serde_json::Value = client.get_json(path).await.map_err(explain)?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn explain(error: RequestError) -> anyhow::Error {
    if error.requires_login() {
        anyhow::Error::new(error).context("Session has ended, run `sessionward login`")
    } else {
        anyhow::Error::new(error).context("Request failed")
    }
}
