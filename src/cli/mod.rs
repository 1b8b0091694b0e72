pub mod daemon_path;
pub mod export;
pub mod process;
pub mod stats;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use export::{process_export_command, ExportCommand};
use process::{restart_server, stop_servers};
use stats::{process_stats_command, StatsCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::{args::DaemonConfig, start_daemon},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX, DAEMON_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "keytally", version, long_about = None)]
#[command(about = "Counts keystrokes and mouse clicks per day", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default $XDG_STATE_HOME/keytally or $HOME/.local/state/keytally"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon for the application")]
    Init {
        #[command(flatten)]
        config: DaemonConfig,
    },
    #[command(about = "Display keystroke and click counts")]
    Stats {
        #[command(flatten)]
        command: StatsCommand,
    },
    #[command(about = "Print the whole history as JSON")]
    Export {
        #[command(flatten)]
        command: ExportCommand,
    },
    #[command(
        about = "Run a daemon directly in current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {
        #[command(flatten)]
        config: DaemonConfig,
    },
    #[command(about = "Stop currently running daemon.")]
    Stop {},
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    let app_dir = args.dir.map_or_else(create_application_default_path, Ok)?;
    let prefix = match args.commands {
        Commands::Serve { .. } => DAEMON_PREFIX,
        _ => CLI_PREFIX,
    };
    enable_logging(prefix, &app_dir, logging_level, args.log)?;

    match args.commands {
        Commands::Init { config } => restart_server(&app_dir, config),
        Commands::Stop {} => {
            let stopped = stop_servers()?;
            println!("Stopped {stopped} daemon(s)");
            Ok(())
        }
        Commands::Serve { config } => start_daemon(app_dir, config).await,
        Commands::Stats { command } => process_stats_command(&app_dir, command).await,
        Commands::Export { command } => process_export_command(&app_dir, command).await,
    }
}
