pub mod fetch;
pub mod orchestrator;
pub mod window;

pub use fetch::{FetchEvent, HttpBackend, NvdHttpClient, PageFetcher, Record, RetryPolicy, Sleeper};
pub use orchestrator::{initialize, maintain, SyncReport};
pub use window::{parse_datetime, resolve_window, StartTime, SyncWindow};
