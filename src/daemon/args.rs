use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

use super::DEFAULT_SAMPLING_INTERVAL_SECONDS;

#[derive(Parser, Debug)]
#[command(name = "flextime-daemon", version, about = "Records computer activity in the background")]
pub struct DaemonArgs {
    /// Stay attached to the current console instead of detaching.
    #[arg(long)]
    pub force: bool,
    #[arg(
        long,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    pub dir: Option<PathBuf>,
    #[arg(
        long,
        default_value_t = DEFAULT_SAMPLING_INTERVAL_SECONDS,
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Seconds between two activity checks"
    )]
    pub interval: u32,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
}
