use crate::mirror::MirrorStore;
use crate::sync::fetch::{FetchEvent, HttpBackend, PageFetcher, Sleeper};
use crate::sync::window::{resolve_window, StartTime, SyncWindow};
use chrono::{DateTime, TimeZone, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use tracing::{info, warn};

/// Totals for one sync invocation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub saved: u64,
    pub skipped: u64,
    pub windows: u64,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "saved {} record(s), skipped {} malformed, across {} window(s)",
            self.saved, self.skipped, self.windows
        )
    }
}

/// Earliest date any record in the dataset could have been modified; the
/// oldest vulnerabilities in the corpus date back to 1988.
pub fn dataset_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1988, 1, 1, 0, 0, 0)
        .single()
        .expect("valid epoch")
}

/// Maintain the mirror: resolve the window, fetch every record modified
/// within it, and persist each one.
///
/// NVD's Best Practices for maintaining data: no more than once every two
/// hours, request a range where lastModStartDate equals the time of the
/// last CVE received and lastModEndDate equals the current time.
///
/// Writes are not rolled back on failure; records saved before an error
/// stay saved, and re-running resumes from the mirror's new
/// latest-modified value.
pub fn maintain<B: HttpBackend, S: Sleeper>(
    store: &MirrorStore,
    fetcher: &PageFetcher<B, S>,
    requested: &StartTime,
    show_progress: bool,
) -> crate::Result<SyncReport> {
    let latest = match requested {
        StartTime::Automatic => {
            info!("searching mirror for most recent lastModified value");
            let scan = store.read_latest_modified()?;
            if scan.skipped > 0 {
                warn!("skipped {} unreadable record file(s) during scan", scan.skipped);
            }
            scan.latest
        }
        StartTime::At(_) => None,
    };

    let window = resolve_window(requested, latest, Utc::now())?;
    sync_window(store, fetcher, window, show_progress)
}

/// Initialize the mirror with the full dataset history.
///
/// Refuses to re-download into a mirror that already holds records
/// unless `force` is set.
pub fn initialize<B: HttpBackend, S: Sleeper>(
    store: &MirrorStore,
    fetcher: &PageFetcher<B, S>,
    force: bool,
    show_progress: bool,
) -> crate::Result<SyncReport> {
    if !force && !store.is_empty()? {
        return Err(crate::NvdMirrorError::MirrorNotEmpty(
            store.root().to_path_buf(),
        ));
    }

    let window = resolve_window(&StartTime::At(dataset_epoch()), None, Utc::now())?;
    sync_window(store, fetcher, window, show_progress)
}

fn sync_window<B: HttpBackend, S: Sleeper>(
    store: &MirrorStore,
    fetcher: &PageFetcher<B, S>,
    window: SyncWindow,
    show_progress: bool,
) -> crate::Result<SyncReport> {
    let sub_windows = window.split(SyncWindow::max_span());
    info!(
        "syncing window {} as {} sub-window(s)",
        window,
        sub_windows.len()
    );

    let mut report = SyncReport::default();

    for sub in sub_windows {
        info!("searching for modified CVEs in {}", sub);

        let mut stream = fetcher.fetch_all(sub.clone());
        let mut progress: Option<ProgressBar> = None;

        while let Some(event) = stream.next() {
            if progress.is_none() && show_progress {
                if let Some(total) = stream.total_results() {
                    progress = Some(make_progress(total, &sub));
                }
            }

            match event {
                Ok(FetchEvent::Record(record)) => {
                    if let Err(e) = store.write(&record) {
                        if let Some(pb) = progress {
                            pb.abandon();
                        }
                        info!("progress before failure: {}", report);
                        return Err(e);
                    }
                    report.saved += 1;
                }
                Ok(FetchEvent::Malformed { offset, reason }) => {
                    warn!("skipping malformed entry at offset {}: {}", offset, reason);
                    report.skipped += 1;
                }
                Err(e) => {
                    if let Some(pb) = progress {
                        pb.abandon();
                    }
                    info!("progress before failure: {}", report);
                    return Err(e);
                }
            }

            if let Some(ref pb) = progress {
                pb.inc(1);
            }
        }

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }
        report.windows += 1;
    }

    info!("sync complete: {}", report);
    Ok(report)
}

fn make_progress(total: u64, window: &SyncWindow) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_message(format!("Syncing {}", window));
    pb
}
