//! scopekeep - Main entry point
//!
//! Security-assessment inventory console: hosts, services, notes and
//! vulnerabilities behind a session-authenticated web UI with password,
//! TOTP, WebAuthn and OIDC login.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use rand::Rng;
use rand::distr::Alphanumeric;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use scopekeep::auth::store::UserStore;
use scopekeep::auth::totp;
use scopekeep::config::{self, Config};
use scopekeep::db::Database;
use scopekeep::server::run_server;

/// scopekeep - security-assessment inventory console
#[derive(Parser)]
#[command(name = "scopekeep")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value_os_t = Config::default_path())]
    config: PathBuf,

    /// Data directory for the database and logs
    #[arg(short, long, default_value_os_t = Config::default_data_dir())]
    data_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web server
    Serve {
        /// Address to listen on (overrides config)
        #[arg(long)]
        listen: Option<SocketAddr>,
    },

    /// User management
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Generate a default configuration file
    InitConfig {
        /// Output path (defaults to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a new user
    Add {
        username: String,

        /// Password; generated and printed when omitted
        #[arg(long)]
        password: Option<String>,

        /// Email used for OIDC account matching
        #[arg(long)]
        email: Option<String>,

        /// Comma-separated roles (user, operator, admin)
        #[arg(long, default_value = "user,operator")]
        roles: String,
    },

    /// List users
    List,

    /// Delete a user and their sessions
    Delete { username: String },

    /// Set a new password
    ResetPassword {
        username: String,

        /// New password; generated and printed when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// TOTP second-factor management
    Totp {
        #[command(subcommand)]
        command: TotpCommands,
    },
}

#[derive(Subcommand)]
enum TotpCommands {
    /// Generate a seed and print the provisioning URI
    Enable { username: String },

    /// Remove the second factor
    Disable { username: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    match cli.command {
        Commands::Serve { listen } => {
            // For daemon mode: log to both stdout and file with rotation
            init_daemon_logging(&cli.data_dir, filter)?;
            serve(&cli.config, &cli.data_dir, listen).await
        }
        Commands::User { command } => {
            init_cli_logging(filter);
            handle_user_command(command, &cli.config, &cli.data_dir).await
        }
        Commands::InitConfig { output } => {
            init_cli_logging(filter);
            generate_config(output)
        }
    }
}

/// Initialize logging for CLI commands (stdout only).
fn init_cli_logging(filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

/// Initialize logging for daemon mode (stdout + rotating file).
fn init_daemon_logging(data_dir: &PathBuf, filter: EnvFilter) -> Result<()> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("scopekeep")
        .filename_suffix("log")
        .build(&log_dir)
        .with_context(|| "Failed to create log file appender")?;

    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer alive for the lifetime of the daemon
    std::mem::forget(_guard);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false)) // stdout
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(non_blocking),
        ) // file
        .init();

    info!("Logging to: {}", log_dir.display());
    Ok(())
}

/// Ensure data directory exists
fn ensure_data_dir(data_dir: &PathBuf) -> Result<()> {
    if !data_dir.exists() {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
        info!("Created data directory: {}", data_dir.display());
    }
    Ok(())
}

/// Run the web server
async fn serve(
    config_path: &PathBuf,
    data_dir: &PathBuf,
    listen_override: Option<SocketAddr>,
) -> Result<()> {
    ensure_data_dir(data_dir)?;

    let mut config = Config::load(config_path)?;
    if let Some(listen) = listen_override {
        config.server.listen_addr = listen.to_string();
    }

    let db = Database::new(&config.database, data_dir).await?;

    info!("scopekeep starting...");
    info!("Listening on: {}", config.server.listen_addr);

    run_server(config, db).await
}

/// Open the store for CLI user management.
async fn open_user_store(config_path: &PathBuf, data_dir: &PathBuf) -> Result<UserStore> {
    ensure_data_dir(data_dir)?;
    let config = Config::load(config_path)?;
    let db = Database::new(&config.database, data_dir).await?;
    Ok(UserStore::new(db.pool()))
}

/// Random initial password for accounts created without one.
fn generate_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

fn parse_roles(raw: &str) -> Result<Vec<String>> {
    const KNOWN: [&str; 3] = ["user", "operator", "admin"];

    let roles: Vec<String> = raw
        .split(',')
        .map(|r| r.trim().to_lowercase())
        .filter(|r| !r.is_empty())
        .collect();

    for role in &roles {
        if !KNOWN.contains(&role.as_str()) {
            return Err(anyhow!(
                "Unknown role: {role}. Known roles: {}",
                KNOWN.join(", ")
            ));
        }
    }
    Ok(roles)
}

/// Handle user subcommands
async fn handle_user_command(
    command: UserCommands,
    config_path: &PathBuf,
    data_dir: &PathBuf,
) -> Result<()> {
    let store = open_user_store(config_path, data_dir).await?;

    match command {
        UserCommands::Add {
            username,
            password,
            email,
            roles,
        } => {
            let roles = parse_roles(&roles)?;
            let generated = password.is_none();
            let password = password.unwrap_or_else(generate_password);

            store
                .create_user(&username, Some(&password), email.as_deref(), &roles)
                .await?;

            println!("User created: {username}");
            println!("  Roles: {}", roles.join(", "));
            if generated {
                println!("  Password: {password}");
            }
            Ok(())
        }

        UserCommands::List => {
            let users = store.list_users().await?;

            if users.is_empty() {
                println!("No users.");
                return Ok(());
            }

            println!(
                "{:<20} {:<30} {:<8} {:<6} {:<25}",
                "USERNAME", "EMAIL", "ACTIVE", "TOTP", "ROLES"
            );
            println!("{}", "-".repeat(92));

            for user in users {
                println!(
                    "{:<20} {:<30} {:<8} {:<6} {:<25}",
                    user.username,
                    user.email.as_deref().unwrap_or("-"),
                    if user.active { "yes" } else { "no" },
                    if user.totp_secret.is_some() { "yes" } else { "no" },
                    user.roles.join(", ")
                );
            }

            Ok(())
        }

        UserCommands::Delete { username } => {
            store.delete_user(&username).await?;
            println!("User deleted: {username}");
            Ok(())
        }

        UserCommands::ResetPassword { username, password } => {
            let generated = password.is_none();
            let password = password.unwrap_or_else(generate_password);

            store.update_password(&username, &password).await?;

            println!("Password updated for {username}.");
            if generated {
                println!("  Password: {password}");
            }
            Ok(())
        }

        UserCommands::Totp { command } => match command {
            TotpCommands::Enable { username } => {
                let secret = totp::generate_secret();
                store.set_totp_secret(&username, Some(&secret)).await?;

                println!("TOTP enabled for {username}.");
                println!(
                    "  Provisioning URI: {}",
                    totp::provisioning_uri(&secret, &username, "scopekeep")
                );
                println!("  Scan it with an authenticator app; codes are required at next login.");
                Ok(())
            }

            TotpCommands::Disable { username } => {
                store.set_totp_secret(&username, None).await?;
                println!("TOTP disabled for {username}.");
                Ok(())
            }
        },
    }
}

/// Generate a default configuration file
fn generate_config(output: Option<PathBuf>) -> Result<()> {
    let config = config::default_config_template();

    match output {
        Some(path) => {
            std::fs::write(&path, &config)?;
            println!("Configuration written to: {}", path.display());
        }
        None => {
            print!("{}", config);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roles() {
        assert_eq!(
            parse_roles("user, Operator").unwrap(),
            vec!["user".to_string(), "operator".to_string()]
        );
        assert!(parse_roles("user,superuser").is_err());
        assert!(parse_roles("").unwrap().is_empty());
    }

    #[test]
    fn test_generated_password_shape() {
        let password = generate_password();
        assert_eq!(password.len(), 24);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
