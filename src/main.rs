use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use sessionbridge_lib::{AppState, AuthConfig, CallbackOutcome, MemoryNavigator, Navigator};

/// Drive the login session from a terminal
#[derive(Parser)]
#[command(name = "sessionbridge", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the hosted login URL to open in a browser
    Login {
        /// Path to return to after login
        #[arg(long)]
        redirect: Option<String>,
    },
    /// Complete a login from the URL the identity provider redirected to
    Callback {
        /// Full redirect URL, including its `#` fragment
        url: String,
    },
    /// End the session with both providers
    Logout {
        #[arg(long)]
        no_redirect: bool,
    },
    /// Show the stored session and both login statuses
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before logging so the filter can come from .env
    let config = AuthConfig::from_env();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if cfg!(debug_assertions) {
                "sessionbridge_lib=debug,sessionbridge=debug,warn".into()
            } else {
                "sessionbridge_lib=info,sessionbridge=info,warn".into()
            }
        }))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    debug!("Logging initialized. Set RUST_LOG to control log levels");

    let cli = Cli::parse();
    let navigator = Arc::new(MemoryNavigator::default());
    let app = AppState::new(config, navigator.clone())
        .context("Failed to initialize session services")?;
    let session = &app.session;

    match cli.command {
        Command::Login { redirect } => {
            session.login(redirect.as_deref())?;
            let url = navigator
                .external_requests()
                .pop()
                .context("Login did not produce an authorization URL")?;
            println!("{}", url);
        }
        Command::Callback { url } => {
            let outcome = session.handle_auth_callback(&url).await;
            session.wait_for_secondary().await;
            match outcome {
                CallbackOutcome::Authenticated => {
                    info!(destination = %navigator.current_path(), "Login complete");
                    print_status(&app);
                }
                CallbackOutcome::Ignored => {
                    anyhow::bail!("URL carries no authentication response")
                }
                CallbackOutcome::Superseded => anyhow::bail!("Login superseded by a logout"),
                CallbackOutcome::ProfileUnavailable(e)
                | CallbackOutcome::Rejected(e)
                | CallbackOutcome::PersistFailed(e) => return Err(e.into()),
            }
        }
        Command::Logout { no_redirect } => {
            session.logout(no_redirect);
            // Let the detached secondary sign-out run before exiting
            tokio::task::yield_now().await;
            println!("Logged out");
        }
        Command::Status => {
            session.wait_for_secondary().await;
            print_status(&app);
        }
    }

    Ok(())
}

fn print_status(app: &AppState) {
    let session = &app.session;
    println!("primary:   {}", session.logged_in());
    println!("secondary: {}", session.logged_in_secondary());

    match session.session() {
        Some(stored) => {
            let expires = stored
                .expires_at_utc()
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| stored.expires_at.to_string());
            println!("expires:   {}", expires);
        }
        None => println!("expires:   -"),
    }

    if let Some(profile) = session.profile() {
        println!("user:      {}", profile.name().or(profile.subject()).unwrap_or("?"));
    }
}
