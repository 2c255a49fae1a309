//! Jobsync CLI - watch and drive the portal's real-time channel.

use clap::{Parser, Subcommand};
use jobsync_types::Role;
use std::path::PathBuf;
use std::time::Duration;

mod commands;
mod config;
mod logging;

use config::CliConfig;
use logging::{init_logging, LogFormat};

/// Jobsync - real-time chat and notification sync for the job portal
#[derive(Parser, Debug)]
#[command(name = "jobsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (YAML)
    #[arg(short, long, env = "JOBSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect and print incoming messages, notifications and status changes
    Watch {
        /// Role to sign in as (job-seeker or employer)
        #[arg(short, long)]
        role: Role,
        /// Subject id (default: from the stored session)
        #[arg(short, long)]
        subject: Option<String>,
    },

    /// Send one chat message
    Send {
        /// Role to sign in as
        #[arg(short, long)]
        role: Role,
        /// Subject id (default: from the stored session)
        #[arg(short, long)]
        subject: Option<String>,
        /// Conversation id
        #[arg(long)]
        conversation: String,
        /// Message text
        content: String,
        /// Seconds to wait for the connection and for the echo
        #[arg(long, default_value_t = 15)]
        timeout: u64,
    },

    /// Manage stored access tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Print the effective configuration
    Config,

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug)]
enum TokenCommands {
    /// Store a token for a role
    Set {
        #[arg(short, long)]
        role: Role,
        #[arg(short, long)]
        subject: String,
        /// Bearer token
        token: String,
    },

    /// Remove the token for a role
    Clear {
        #[arg(short, long)]
        role: Role,
    },

    /// List stored sessions
    Show,
}

fn log_level(verbose: u8, configured: &str) -> &str {
    match verbose {
        0 => configured,
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = CliConfig::load(cli.config.as_deref())?;

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::parse(&config.log_format)
    };
    init_logging(log_level(cli.verbose, &config.log_level), format);

    match cli.command {
        Commands::Watch { role, subject } => commands::watch(&config, role, subject).await,
        Commands::Send {
            role,
            subject,
            conversation,
            content,
            timeout,
        } => {
            commands::send(
                &config,
                role,
                subject,
                &conversation,
                &content,
                Duration::from_secs(timeout),
            )
            .await
        }
        Commands::Token { command } => match command {
            TokenCommands::Set {
                role,
                subject,
                token,
            } => commands::token_set(&config, role, subject, token),
            TokenCommands::Clear { role } => commands::token_clear(&config, role),
            TokenCommands::Show => commands::token_show(&config),
        },
        Commands::Config => commands::show_config(&config),
        Commands::Version => {
            println!("jobsync {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watch() {
        let cli = Cli::try_parse_from(["jobsync", "-vv", "watch", "--role", "employer"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Watch { role, subject } => {
                assert_eq!(role, Role::Employer);
                assert!(subject.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_send() {
        let cli = Cli::try_parse_from([
            "jobsync",
            "send",
            "--role",
            "job-seeker",
            "--conversation",
            "42",
            "hello there",
        ])
        .unwrap();
        match cli.command {
            Commands::Send {
                role,
                conversation,
                content,
                timeout,
                ..
            } => {
                assert_eq!(role, Role::JobSeeker);
                assert_eq!(conversation, "42");
                assert_eq!(content, "hello there");
                assert_eq!(timeout, 15);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_role() {
        assert!(Cli::try_parse_from(["jobsync", "watch", "--role", "admin"]).is_err());
    }

    #[test]
    fn test_parse_token_set() {
        let cli = Cli::try_parse_from([
            "jobsync", "token", "set", "--role", "EMPLOYER", "--subject", "7", "tok",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Token {
                command: TokenCommands::Set { role: Role::Employer, .. }
            }
        ));
    }

    #[test]
    fn test_log_level_from_verbosity() {
        assert_eq!(log_level(0, "warn"), "warn");
        assert_eq!(log_level(1, "warn"), "info");
        assert_eq!(log_level(3, "warn"), "trace");
    }
}
