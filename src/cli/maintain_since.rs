use crate::mirror::MirrorStore;
use crate::sync::orchestrator::maintain;
use crate::sync::window::parse_datetime;
use crate::sync::{PageFetcher, StartTime};
use chrono::{DateTime, Utc};
use clap::Args;
use tracing::info;

#[derive(Args)]
pub struct MaintainSinceArgs {
    /// Start of the window: YYYY-MM-DD or an ISO-8601 datetime
    #[arg(value_parser = parse_datetime)]
    since: DateTime<Utc>,
    /// Suppress progress output
    #[arg(long)]
    quiet: bool,
}

pub fn maintain_since_command(args: MaintainSinceArgs, store: &MirrorStore) -> crate::Result<()> {
    info!("maintaining mirror at {} since {}", store.root(), args.since);

    let fetcher = PageFetcher::new();
    let report = maintain(store, &fetcher, &StartTime::At(args.since), !args.quiet)?;

    println!("{}", report);
    Ok(())
}
