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
    /// Module definition to generate the modulemd from
    #[arg(long, default_value = "modulemd.toml")]
    pub profile: PathBuf,
    /// Module name, defaults to the name of the current directory
    #[arg(long)]
    pub module: Option<String>,
    /// Module stream, defaults to the checked out git branch
    #[arg(long)]
    pub stream: Option<String>,
    /// Where to write the modulemd, defaults to `<module>.yaml`
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
