pub mod manual;
pub mod output;
pub mod process;
pub mod report;

use std::{env, path::PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use process::{kill_previous_servers, restart_server};
use report::{process_report_command, ReportCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::{start_daemon, DEFAULT_SAMPLING_INTERVAL_SECONDS},
    utils::{
        dir::resolve_application_path,
        logging::{enable_logging, CLI_PREFIX, DAEMON_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "flextime", version, long_about = None)]
#[command(about = "Tracks when you work from your computer activity", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon for the application")]
    Init {
        #[arg(
            long,
            default_value_t = DEFAULT_SAMPLING_INTERVAL_SECONDS,
            value_parser = clap::value_parser!(u32).range(1..),
            help = "Seconds between two activity checks"
        )]
        interval: u32,
    },
    #[command(about = "Print worked time for every recorded day")]
    Report {
        #[command(flatten)]
        command: ReportCommand,
    },
    #[command(
        about = "Run a daemon directly in current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {
        #[arg(
            long,
            default_value_t = DEFAULT_SAMPLING_INTERVAL_SECONDS,
            value_parser = clap::value_parser!(u32).range(1..),
            help = "Seconds between two activity checks"
        )]
        interval: u32,
    },
    #[command(about = "Stop currently running daemon.")]
    Stop {},
}

impl Commands {
    /// `serve` is the daemon running in the foreground, so it logs next to the detached one.
    fn log_prefix(&self) -> &'static str {
        match self {
            Commands::Serve { .. } => DAEMON_PREFIX,
            _ => CLI_PREFIX,
        }
    }
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();
    let app_dir = resolve_application_path(args.dir)?;

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(
        args.commands.log_prefix(),
        &app_dir,
        logging_level,
        LevelFilter::INFO,
        args.log,
    )?;

    match args.commands {
        Commands::Init { interval } => restart_server(&app_dir, interval),
        Commands::Stop {} => {
            let process_name = env::current_exe()?;
            kill_previous_servers(&process_name)
        }
        Commands::Serve { interval } => start_daemon(app_dir, interval).await,
        Commands::Report { command } => process_report_command(command, &app_dir).await,
    }
}
