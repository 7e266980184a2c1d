use crate::mirror::MirrorStore;
use crate::sync::orchestrator::maintain;
use crate::sync::{PageFetcher, StartTime};
use clap::Args;
use tracing::info;

#[derive(Args)]
pub struct AutoArgs {
    /// Suppress progress output
    #[arg(long)]
    quiet: bool,
}

pub fn auto_command(args: AutoArgs, store: &MirrorStore) -> crate::Result<()> {
    info!("automatic maintenance of mirror at {}", store.root());

    let fetcher = PageFetcher::new();
    let report = maintain(store, &fetcher, &StartTime::Automatic, !args.quiet)?;

    println!("{}", report);
    Ok(())
}
