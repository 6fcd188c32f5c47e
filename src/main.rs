//! Binary entrypoint for the nodecore CLI.
//!
//! Commands:
//! - `init` - write a default `nodecore.toml` (if absent) and create the settings file
//! - `show` - print the current device settings as JSON (secrets masked)
//! - `reset` - restore factory settings
//! - `passwd` - interactively change the admin password
//! - `run` - bring up settings and authentication and sweep expired sessions until Ctrl-C
//!
//! See the library crate docs for module-level details: `nodecore::`.
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};

use nodecore::auth::SessionAuthenticator;
use nodecore::config::Config;
use nodecore::logutil::mask_secret;
use nodecore::settings::{ConfigManager, SystemSettings};
use nodecore::sweeper::SessionSweeper;

#[derive(Parser)]
#[command(name = "nodecore")]
#[command(about = "Device settings store and session authentication")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Runtime configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "nodecore.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the runtime config and the device settings file
    Init,
    /// Print device settings as JSON
    Show,
    /// Reset device settings to factory defaults
    Reset,
    /// Change the admin password
    Passwd,
    /// Run the settings and authentication core until interrupted
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Init) && !Path::new(&cli.config).exists() {
        Config::create_default(&cli.config).await?;
        println!("Runtime configuration created at {}", cli.config);
    }

    let config = match Config::load(&cli.config).await {
        Ok(cfg) => cfg,
        Err(e) if !Path::new(&cli.config).exists() => {
            eprintln!("{} (using built-in defaults)", e);
            Config::default()
        }
        Err(e) => return Err(e),
    };
    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Init => {
            let manager = open_settings(&config)?;
            info!(
                "Device settings available at {}",
                manager.settings_path().display()
            );
        }
        Commands::Show => {
            let manager = open_settings(&config)?;
            let settings = masked(manager.load()?);
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Commands::Reset => {
            let manager = open_settings(&config)?;
            manager.reset_to_default()?;
            println!("Device settings reset to factory defaults.");
        }
        Commands::Passwd => {
            let manager = Arc::new(open_settings(&config)?);
            let auth = build_authenticator(&config, manager.clone())?;
            let username = manager.get_auth()?.username;
            println!("Changing password for '{}'.", username);

            let current = rpassword::prompt_password("Current password: ")?;
            let pass1 = rpassword::prompt_password("New password: ")?;
            if pass1.is_empty() {
                println!("Error: password must not be empty.");
                return Ok(());
            }
            let pass2 = rpassword::prompt_password("Confirm password: ")?;
            if pass1 != pass2 {
                println!("Error: passwords do not match.");
                return Ok(());
            }
            match auth.change_password(&username, &current, &pass1) {
                Ok(()) => println!("Password updated successfully."),
                Err(e) => println!("Error: {e}"),
            }
        }
        Commands::Run => {
            info!("Starting nodecore v{}", env!("CARGO_PKG_VERSION"));
            let manager = Arc::new(open_settings(&config)?);
            let auth = Arc::new(build_authenticator(&config, manager.clone())?);

            let sweeper = match config.sessions.cleanup_interval_secs {
                0 => {
                    warn!("Session sweeper disabled; expiry is checked on access only");
                    None
                }
                secs => Some(SessionSweeper::spawn(
                    auth.clone(),
                    Duration::from_secs(secs),
                )),
            };

            info!("nodecore ready; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            info!("Shutting down");
            if let Some(sweeper) = sweeper {
                sweeper.shutdown().await;
            }
        }
    }

    Ok(())
}

/// Settings are critical: a failure here aborts the command.
fn open_settings(config: &Config) -> Result<ConfigManager> {
    let manager = ConfigManager::from_config(&config.storage);
    manager.initialize().map_err(|e| {
        error!("CRITICAL: configuration manager failed: {}", e);
        anyhow!("configuration manager failed to initialize: {}", e)
    })?;
    Ok(manager)
}

fn build_authenticator(
    config: &Config,
    manager: Arc<ConfigManager>,
) -> Result<SessionAuthenticator> {
    let timeout = manager.get_timeouts()?.session_max_age();
    let auth = SessionAuthenticator::new(manager)
        .with_capacity(config.sessions.capacity)
        .with_timeout(timeout);
    auth.initialize().map_err(|e| {
        error!("CRITICAL: authentication failed to initialize: {}", e);
        anyhow!("authentication failed to initialize: {}", e)
    })?;
    Ok(auth)
}

fn masked(mut s: SystemSettings) -> SystemSettings {
    s.auth.password_hash = mask_secret(&s.auth.password_hash);
    s.wifi_ap.password = mask_secret(&s.wifi_ap.password);
    s.wifi_sta.password = mask_secret(&s.wifi_sta.password);
    s.bluetooth.pairing_password = mask_secret(&s.bluetooth.pairing_password);
    s
}

fn init_logging(config: &Config, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config.logging.level_filter(),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config.logging.file.as_ref().and_then(|file| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(file)
            .ok()
    });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Foreground runs mirror the file output on the console
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            writeln!(
                fmt,
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
}
