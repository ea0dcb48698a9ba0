use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    /// Verbose logging
    #[arg(short, long, global = true, action(ArgAction::Count))]
    pub verbose: u8,
    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Bypass tty detection and always use colors
    #[arg(short = 'C', long, global = true)]
    pub color: bool,
    /// Which tags to compare and where to look up upstream versions
    #[arg(long, default_value = "versions.toml")]
    pub profile: PathBuf,
    /// Where to write the report, defaults to a timestamped file in the current directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
