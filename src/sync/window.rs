use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use std::fmt;

/// The NVD API rejects lastModified windows wider than 120 days.
/// (An undocumented restriction.)
pub const MAX_WINDOW_DAYS: i64 = 120;

/// Requested start of a maintenance pass.
#[derive(Debug, Clone)]
pub enum StartTime {
    /// Derive the start from the mirror's most recent lastModified value.
    Automatic,
    At(DateTime<Utc>),
}

/// Half-open interval `[start, end)` of lastModified values to fetch.
///
/// `end` is fixed when the window is resolved and does not advance during
/// pagination, so modifications arriving mid-sync are deferred to the next
/// pass instead of straddling the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    /// Split into consecutive non-overlapping sub-windows of at most
    /// `max_span`, in chronological order. Their union is exactly `self`.
    pub fn split(&self, max_span: TimeDelta) -> Vec<SyncWindow> {
        let mut windows = Vec::new();
        let mut start = self.start;
        while start < self.end {
            let end = std::cmp::min(start + max_span, self.end);
            windows.push(SyncWindow { start, end });
            start = end;
        }
        windows
    }

    pub fn max_span() -> TimeDelta {
        TimeDelta::days(MAX_WINDOW_DAYS)
    }
}

impl fmt::Display for SyncWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Parse a user- or mirror-supplied datetime.
///
/// Accepts a bare `YYYY-MM-DD` date (midnight UTC), a full ISO-8601
/// datetime with an offset, or a naive ISO-8601 datetime treated as UTC.
/// NVD's own lastModified values are the naive form.
pub fn parse_datetime(input: &str) -> crate::Result<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    Err(crate::NvdMirrorError::InvalidTimeFormat(input.to_string()))
}

/// Resolve the window for one sync pass.
///
/// An explicit start is used as-is; `Automatic` takes the mirror's most
/// recent lastModified value and fails on an empty mirror.
pub fn resolve_window(
    requested: &StartTime,
    latest: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> crate::Result<SyncWindow> {
    let start = match requested {
        StartTime::At(dt) => *dt,
        StartTime::Automatic => latest.ok_or(crate::NvdMirrorError::EmptyMirror)?,
    };
    if start >= now {
        return Err(crate::NvdMirrorError::InvalidWindow(format!(
            "start {} is not before end {}",
            start, now
        )));
    }
    Ok(SyncWindow { start, end: now })
}

/// Format a datetime for the API's lastModStartDate/lastModEndDate query
/// parameters: microsecond precision, with the `+` of the UTC offset
/// already percent-encoded.
pub fn api_datetime(dt: &DateTime<Utc>) -> String {
    format!("{}%2B00:00", dt.format("%Y-%m-%dT%H:%M:%S%.6f"))
}
