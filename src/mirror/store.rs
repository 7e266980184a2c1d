use crate::sync::fetch::Record;
use crate::sync::window::parse_datetime;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use std::fs;
use tracing::{debug, warn};

/// Result of scanning the mirror for its most recent lastModified value.
#[derive(Debug, Default)]
pub struct MirrorScan {
    pub latest: Option<DateTime<Utc>>,
    pub records: usize,
    /// Files that were unreadable, not JSON, or missing a parsable
    /// lastModified field. Skipped, never fatal.
    pub skipped: usize,
}

/// Owns all filesystem access under the mirror directory. One JSON file
/// per CVE id; records are overwritten by newer versions, never deleted.
pub struct MirrorStore {
    root: Utf8PathBuf,
}

impl MirrorStore {
    /// Open the mirror at `root`, creating the directory if needed.
    pub fn open(root: impl AsRef<Utf8Path>) -> crate::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// On-disk location for a record id. Identifiers are sanitized so no
    /// path separator or traversal sequence can escape the mirror root.
    pub fn path_for(&self, id: &str) -> Utf8PathBuf {
        self.root.join(format!("{}.json", sanitize_id(id)))
    }

    /// Whether the mirror holds any record files yet.
    pub fn is_empty(&self) -> crate::Result<bool> {
        for entry in self.root.read_dir_utf8()? {
            let entry = entry?;
            if entry.file_type()?.is_file() && entry.path().extension() == Some("json") {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Persist a record, overwriting any previous version with the same
    /// id. The payload is written to a temp file first and renamed into
    /// place so a crash mid-write never leaves a truncated record.
    pub fn write(&self, record: &Record) -> crate::Result<()> {
        let dest = self.path_for(&record.id);
        // pid suffix keeps concurrent invocations from clobbering each
        // other's temp files
        let tmp = self.root.join(format!(
            ".{}.{}.tmp",
            sanitize_id(&record.id),
            std::process::id()
        ));

        let content = serde_json::to_string(&record.payload)?;
        fs::write(&tmp, content).map_err(|source| crate::NvdMirrorError::MirrorWrite {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &dest).map_err(|source| crate::NvdMirrorError::MirrorWrite {
            path: dest.clone(),
            source,
        })?;

        debug!("saved {}", record.id);
        Ok(())
    }

    /// Scan every stored record for the maximum lastModified value.
    ///
    /// Inefficiency is fine here: this runs once per pass, and only when
    /// the caller does not know when maintenance was last run.
    pub fn read_latest_modified(&self) -> crate::Result<MirrorScan> {
        let mut scan = MirrorScan::default();

        for entry in self.root.read_dir_utf8()? {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type()?.is_file() || path.extension() != Some("json") {
                continue;
            }

            let modified = fs::read_to_string(path)
                .ok()
                .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
                .and_then(|value| {
                    value
                        .get("lastModified")
                        .and_then(|v| v.as_str())
                        .and_then(|s| parse_datetime(s).ok())
                });

            match modified {
                Some(modified) => {
                    scan.records += 1;
                    if scan.latest.map_or(true, |latest| modified > latest) {
                        scan.latest = Some(modified);
                    }
                }
                None => {
                    warn!("skipping unreadable record {}", path);
                    scan.skipped += 1;
                }
            }
        }

        debug!(
            "most recent lastModified value is {:?} ({} records, {} skipped)",
            scan.latest, scan.records, scan.skipped
        );
        Ok(scan)
    }
}

fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}
