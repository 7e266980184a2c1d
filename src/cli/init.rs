use crate::mirror::MirrorStore;
use crate::sync::orchestrator::initialize;
use crate::sync::PageFetcher;
use clap::Args;
use tracing::info;

#[derive(Args)]
pub struct InitArgs {
    /// Re-download even if the mirror already contains records
    #[arg(long)]
    force: bool,
    /// Suppress progress output
    #[arg(long)]
    quiet: bool,
}

pub fn init_command(args: InitArgs, store: &MirrorStore) -> crate::Result<()> {
    info!("initializing mirror at {}", store.root());

    let fetcher = PageFetcher::new();
    let report = initialize(store, &fetcher, args.force, !args.quiet)?;

    println!("{}", report);
    Ok(())
}
