use anyhow::Result;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orwell_core::{AppConfig, ClientArgs};

mod commands;

#[derive(Parser)]
#[command(name = "orwell")]
#[command(author, version, about = "Log terminal pane commands and their output")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Relay a pane's commands to the logger
    Client {
        /// Multiplexer session the pane belongs to
        session: String,
        /// First identifier used to name the instance marker
        token1: String,
        /// Second identifier used to name the instance marker
        token2: String,
        /// Pane process id; the client exits once it is gone
        pane_pid: u32,
    },
    /// Run the logging daemon
    Server,
}

fn print_usage() {
    println!("{}", Cli::command().render_usage());
}

/// Outcome of reading the command line
enum Invocation {
    Run(Commands),
    Usage,
}

/// Parse arguments, falling back to the usage line whenever no subcommand was chosen.
///
/// Help and version requests, and errors inside a subcommand, stay clap errors.
fn parse_invocation<I, T>(args: I) -> std::result::Result<Invocation, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let args: Vec<std::ffi::OsString> = args.into_iter().map(Into::into).collect();

    match Cli::try_parse_from(&args) {
        Ok(Cli { command: Some(command) }) => Ok(Invocation::Run(command)),
        Ok(Cli { command: None }) => Ok(Invocation::Usage),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => Err(e),
        Err(e) => {
            let first = args.get(1).and_then(|a| a.to_str()).unwrap_or_default();
            let chose_subcommand = Cli::command()
                .get_subcommands()
                .any(|sub| sub.get_name() == first);
            if chose_subcommand {
                Err(e)
            } else {
                Ok(Invocation::Usage)
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let command = match parse_invocation(std::env::args_os()) {
        Ok(Invocation::Run(command)) => command,
        Ok(Invocation::Usage) => {
            print_usage();
            return Ok(());
        }
        Err(e) => e.exit(),
    };

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match command {
        Commands::Client {
            session,
            token1,
            token2,
            pane_pid,
        } => {
            let args = ClientArgs {
                session,
                token1,
                token2,
                pane_pid,
            };
            commands::client::run(args, &config).await
        }
        Commands::Server => commands::server::run(&config).await,
    }
}
