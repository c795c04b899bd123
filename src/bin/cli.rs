//! Guardian CLI
//!
//! Command-line front end for the parental control dashboard:
//! - Log in and manage stored tokens
//! - Fetch device usage
//! - Watch the update stream

use anyhow::Context;
use clap::{Parser, Subcommand};
use guardian_dashboard::config::generate_default_config;
use guardian_dashboard::tokens::mask_token;
use guardian_dashboard::*;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "guardian")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Parental control dashboard client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Dashboard server URL, overrides the config file
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Obtain and store a token pair
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },

    /// Forget stored tokens
    Logout,

    /// Show the stored tokens (masked) and where they were found
    Token,

    /// Exchange the refresh token for a new access token
    Refresh,

    /// Show screen time for a device
    Usage {
        /// Device identifier
        device_id: String,
    },

    /// Authenticated GET of an arbitrary API path
    Get {
        /// Path relative to the server, e.g. /api/report/tablet-1/
        path: String,
    },

    /// Poll for updates and print them until interrupted
    Watch,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        return write_default_config(output.as_deref());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(base_url) = &cli.base_url {
        config.api.base_url = base_url.clone();
    }

    init_logging(&config.logging);
    tracing::debug!(base_url = %config.api.base_url, "Guardian v{}", env!("CARGO_PKG_VERSION"));

    let tokens = Arc::new(TokenStore::open(&config.storage).with_context(|| {
        format!("opening token store in {}", config.storage.data_path().display())
    })?);
    let redirect = Arc::new(LoginRedirect::new());
    let client = Arc::new(AuthClient::new(
        config.api.clone(),
        tokens.clone(),
        redirect.clone(),
    )?);
    let json = cli.format == "json";

    let result = run(cli.command, &config, &client, &tokens, json).await;

    if redirect.location().is_some() {
        eprintln!("Session expired. Log in again with `guardian login`.");
    }
    result
}

async fn run(
    command: Commands,
    config: &Config,
    client: &Arc<AuthClient>,
    tokens: &Arc<TokenStore>,
    json: bool,
) -> anyhow::Result<()> {
    match command {
        Commands::Login { username, password } => {
            let login = client.login(&username, &password).await?;
            if json {
                println!("{}", serde_json::json!({ "user": login.user, "logged_in": true }));
            } else {
                println!("Logged in as {}", username);
            }
        }

        Commands::Logout => {
            tokens.clear()?;
            println!("Stored tokens cleared");
        }

        Commands::Token => {
            let access = tokens.token_with_source();
            let refresh = tokens.refresh_token_with_source();

            if json {
                let describe = |t: &Option<(String, TokenSource)>| {
                    t.as_ref().map(|(token, source)| {
                        serde_json::json!({ "token": mask_token(token), "source": source.to_string() })
                    })
                };
                println!(
                    "{}",
                    serde_json::json!({
                        "access": describe(&access),
                        "refresh": describe(&refresh),
                        "csrf": tokens.csrf_token().is_some(),
                    })
                );
            } else {
                for (label, token) in [("access", &access), ("refresh", &refresh)] {
                    match token {
                        Some((token, source)) => {
                            println!("{:<8} {}  ({})", label, mask_token(token), source)
                        }
                        None => println!("{:<8} -", label),
                    }
                }
            }
        }

        Commands::Refresh => {
            match client.refresh().await {
                Ok(()) => println!("Access token refreshed"),
                Err(e) => {
                    client.redirect_to_login();
                    return Err(e.into());
                }
            }
        }

        Commands::Usage { device_id } => {
            let usage = client.usage_data(&device_id).await?;
            let summary = usage.summary();

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Usage for {}", summary.device);
                println!("{:<30} {:>8}", "APP", "HOURS");
                println!("{}", "-".repeat(39));
                for app in &summary.apps {
                    println!("{:<30} {:>8.2}", app.name, app.hours);
                }
                println!("{}", "-".repeat(39));
                println!("{:<30} {:>8.2}", "total", summary.total_hours);
                if let Some((day, hours)) = &summary.busiest_day {
                    println!("Busiest day: {} ({:.2} h)", day, hours);
                }
            }
        }

        Commands::Get { path } => {
            let response = client.request(&path, RequestOptions::get()).await?;
            let status = response.status();
            let body = response.text().await?;
            if !json {
                eprintln!("{}", status);
            }
            println!("{}", body);
        }

        Commands::Watch => watch(config, client, tokens, json).await?,

        Commands::Config { output } => write_default_config(output.as_deref())?,
    }

    Ok(())
}

fn write_default_config(output: Option<&std::path::Path>) -> anyhow::Result<()> {
    let content = generate_default_config();
    match output {
        Some(path) => {
            std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
            println!("Config written to {}", path.display());
        }
        None => print!("{}", content),
    }
    Ok(())
}

async fn watch(
    config: &Config,
    client: &Arc<AuthClient>,
    tokens: &Arc<TokenStore>,
    json: bool,
) -> anyhow::Result<()> {
    let source = Arc::new(EventsEndpoint::new(client.clone(), &config.poller));
    let poller = Arc::new(EventPoller::new(source, tokens.clone(), config.poller.clone()));
    let mut updates = poller.subscribe();

    let mut handle = poller
        .clone()
        .start()
        .await
        .context("not logged in, run `guardian login` first")?;

    let mut ended = false;
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(update) => {
                    if json {
                        println!("{}", serde_json::to_string(&update)?);
                    } else {
                        println!("[{}] {}", update.received_at.format("%H:%M:%S"), update.payload);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Output fell behind, dropped updates");
                }
                Err(RecvError::Closed) => break,
            },
            // The poller ends on its own once the session is gone
            finished = &mut handle => {
                finished?;
                ended = true;
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    if !ended {
        poller.stop().await;
        handle.await?;
    }

    let stats = poller.stats().await;
    tracing::info!(polls = stats.polls, failures = stats.failures, "Watch finished");
    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "guardian_dashboard={0},guardian={0}",
            config.level
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
