use clap::Parser;
use nvd_mirror::cli::{run_cli, Cli};
use tracing::{error, info};
use tracing_subscriber::fmt;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Diagnostics go to stderr so the terminal summary stays on stdout
    fmt()
        .with_max_level(cli.log_level())
        .with_writer(std::io::stderr)
        .init();

    info!("Starting nvd-mirror");

    if let Err(e) = run_cli(cli) {
        error!("Application error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
