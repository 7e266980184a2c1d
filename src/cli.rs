use camino::Utf8PathBuf;
use clap::{ArgAction, Parser, Subcommand};
use tracing::Level;

use crate::cli::{
    auto::{auto_command, AutoArgs},
    init::{init_command, InitArgs},
    maintain_since::{maintain_since_command, MaintainSinceArgs},
};
use crate::mirror::MirrorStore;
use crate::settings::Settings;

pub mod auto;
pub mod init;
pub mod maintain_since;

#[derive(Parser)]
#[command(name = "nvd-mirror")]
#[command(about = "Download and maintain a local mirror of the NVD CVE dataset")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase diagnostic output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file (defaults to ~/.config/nvd-mirror.conf)
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Mirror directory, overriding the configuration file
    #[arg(long, global = true)]
    pub mirror_path: Option<Utf8PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the mirror by downloading the full CVE dataset
    Init(InitArgs),
    /// Download CVEs modified since an explicit date or datetime
    MaintainSince(MaintainSinceArgs),
    /// Maintain the mirror from its own most recent lastModified value
    Auto(AutoArgs),
}

impl Cli {
    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

pub fn run_cli(cli: Cli) -> crate::Result<()> {
    let mirror_path = match cli.mirror_path {
        Some(path) => path,
        None => Settings::load(cli.config.as_deref())?.mirror_path,
    };
    let store = MirrorStore::open(&mirror_path)?;

    match cli.command {
        Commands::Init(init_args) => init_command(init_args, &store),
        Commands::MaintainSince(maintain_args) => maintain_since_command(maintain_args, &store),
        Commands::Auto(auto_args) => auto_command(auto_args, &store),
    }
}
