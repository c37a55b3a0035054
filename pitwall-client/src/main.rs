//! pitwall - race prediction client
//!
//! Command-line front end over the session/entitlement subsystem. Each
//! invocation resolves the stored session from scratch; nothing is assumed
//! valid across runs.

use anyhow::Result;
use clap::{Parser, Subcommand};
use pitwall_client::{ClientError, Disposition, PitwallClient};
use pitwall_common::config::{ClientConfig, CliOverrides, ENV_LOG_LEVEL};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for pitwall
#[derive(Parser, Debug)]
#[command(name = "pitwall")]
#[command(about = "Race prediction client")]
#[command(version)]
struct Args {
    /// Backend base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Credential store document
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Provider-issued session document
    #[arg(long, global = true)]
    federated_session: Option<PathBuf>,

    /// Per-request timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Config file (skips the platform search)
    #[arg(long, global = true, env = "PITWALL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "PITWALL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in with it
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "PITWALL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Clear the stored session
    Logout,
    /// Show the signed-in profile
    Whoami,
    /// Show the confirmed plan
    Tier,
    /// Upgrade to the pro plan
    Upgrade,
    /// List races visible on the current plan
    Races,
    /// Show one race's details
    Race { race_id: i64 },
    /// List drivers
    Drivers,
    /// Predict the finishing order of a race
    Predict { race_id: i64 },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let cli = CliOverrides {
        api_url: args.api_url.clone(),
        store_path: args.store.clone(),
        federated_session_path: args.federated_session.clone(),
        request_timeout_ms: args.timeout_ms,
        log_level: args.log_level.clone(),
        config_file: args.config.clone(),
    };
    // Initialize tracing before config resolution so its warnings are seen;
    // the level is settled once the config file has been read
    let rust_log = EnvFilter::try_from_default_env().ok();
    let follows_config = rust_log.is_none();
    let provisional_level = args
        .log_level
        .clone()
        .or_else(|| std::env::var(ENV_LOG_LEVEL).ok().filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| "info".to_string());
    let (filter, filter_handle) = reload::Layer::new(
        rust_log.unwrap_or_else(|| EnvFilter::new(default_directives(&provisional_level))),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match ClientConfig::resolve(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("pitwall: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if follows_config && config.log_level != provisional_level {
        if let Err(e) = filter_handle.reload(EnvFilter::new(default_directives(&config.log_level))) {
            warn!(error = %e, "Failed to apply configured log level");
        }
    }

    info!(api_url = %config.api_url, store = %config.store_path.display(), "Starting pitwall");

    match run(args.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<ClientError>() {
                Some(client_error) => report(client_error),
                None => eprintln!("pitwall: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

/// Filter directives for our crates when RUST_LOG is unset
fn default_directives(level: &str) -> String {
    format!("pitwall={0},pitwall_client={0},pitwall_common={0}", level)
}

fn report(err: &ClientError) {
    match err.disposition() {
        Disposition::RedirectToSignIn => {
            eprintln!("{} Run `pitwall login`.", err.user_message());
        }
        Disposition::RetryableBanner => eprintln!("{}", err.user_message()),
        Disposition::GenericFailure => {
            error!(error = %err, "Request failed");
            eprintln!("{}", err.user_message());
        }
        Disposition::Silent => {}
    }
}

async fn run(command: Command, config: &ClientConfig) -> Result<()> {
    let client = PitwallClient::from_config(config)?;
    let cancel = CancellationToken::new();

    // Ctrl+C behaves like navigating away: in-flight calls are abandoned
    let canceller = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    match command {
        Command::Login { email, password } => {
            let actor = client.sign_in(&email, &password).await?;
            println!("Signed in as {}", actor.email);
        }
        Command::Register { email, password } => {
            let actor = client.register(&email, &password).await?;
            println!("Account created, signed in as {}", actor.email);
        }
        Command::Logout => {
            client.sign_out().await?;
            println!("Signed out");
        }
        Command::Whoami => {
            let profile = client.profile(&cancel).await?;
            println!("{}", profile.name.as_deref().unwrap_or("F1 Racer"));
            println!("  email:           {}", profile.email);
            println!(
                "  favorite team:   {}",
                profile.favorite_team.as_deref().unwrap_or("Not Set")
            );
            println!(
                "  favorite driver: {}",
                profile.favorite_driver.as_deref().unwrap_or("Not Set")
            );
        }
        Command::Tier => {
            let record = client.sync(&cancel).await?;
            match record.tier.tier() {
                Some(tier) => println!("{} plan ({})", tier.as_str().to_uppercase(), record.email),
                None => return Err(ClientError::TierUnknown.into()),
            }
        }
        Command::Upgrade => {
            client.sync(&cancel).await?;
            let record = client.upgrade(&cancel).await?;
            match record.tier.tier() {
                Some(tier) => println!("Plan is now {}", tier.as_str().to_uppercase()),
                None => return Err(ClientError::TierUnknown.into()),
            }
        }
        Command::Races => {
            let page = client.open_gated_page(&cancel).await?;
            for race in &page.races {
                match (race.season, race.round) {
                    (Some(season), Some(round)) => {
                        println!("{:>6}  {} (Round {} • {})", race.id, race.name, round, season)
                    }
                    _ => println!("{:>6}  {}", race.id, race.name),
                }
            }
        }
        Command::Race { race_id } => {
            let race = client.race(race_id, &cancel).await?;
            println!("{} (#{})", race.name, race.id);
            if let Some(date) = race.race_date {
                println!("  date:       {}", date.format("%Y-%m-%d"));
            }
            println!("  winner:     {}", race.winner.as_deref().unwrap_or("TBD"));
            if let Some(highlights) = race.highlights.as_deref() {
                println!("  highlights: {}", highlights);
            }
        }
        Command::Drivers => {
            let page = client.open_gated_page(&cancel).await?;
            for driver in page.drivers.sorted() {
                println!("{:>6}  {}", driver.id, page.drivers.display_name(driver.id));
            }
        }
        Command::Predict { race_id } => {
            let page = client.open_gated_page(&cancel).await?;
            let prediction = client.predict(&page, race_id, &cancel).await?;
            println!(
                "Race {} (generated {})",
                prediction.race_id,
                prediction.created_at.format("%Y-%m-%d %H:%M UTC")
            );
            for (rank, candidate) in prediction.ranked.iter().enumerate() {
                println!(
                    "  P{}  {:<32} {:>5.1}%",
                    rank + 1,
                    page.drivers.display_name(candidate.candidate_id),
                    candidate.probability * 100.0
                );
            }
        }
    }

    Ok(())
}
