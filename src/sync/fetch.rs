use crate::sync::window::{api_datetime, SyncWindow};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT};
use serde::Deserialize;
use std::cell::Cell;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

pub const BASE_URL: &str = "https://services.nvd.nist.gov/rest/json/cves/2.0";

/// The API's practical maximum page size.
pub const RESULTS_PER_PAGE: u64 = 2000;

/// Seconds to wait between requests.
///
/// NVD's public rate limit is 5 requests in a rolling 30 second window;
/// sleeping 6 seconds between requests aligns with NVD's Best Practices
/// when no API key is in use.
const RATE_LIMIT_SECS: u64 = 6;

const TIMEOUT_SECS: u64 = 30;

type TransportError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Seam between pagination logic and the wire. A transport-level `Err`
/// (connect failure, timeout) is always treated as transient.
pub trait HttpBackend {
    fn get(&self, url: &str) -> Result<HttpResponse, TransportError>;
}

/// Blocking reqwest client with the headers the NVD API expects.
pub struct NvdHttpClient {
    client: Client,
}

impl NvdHttpClient {
    pub fn new() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US"));
        headers.insert(USER_AGENT, HeaderValue::from_static("nvd-mirror"));

        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .default_headers(headers)
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }
}

impl Default for NvdHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpBackend for NvdHttpClient {
    fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let response = self.client.get(url).send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(HttpResponse { status, body })
    }
}

/// All delays go through this so tests can substitute a fake clock.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Scheduling policy for rate limiting and retry-with-backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub rate_limit: Duration,
}

impl RetryPolicy {
    /// Exponential backoff: base_delay doubled per failed attempt.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay * (1 << (attempt - 1).min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(RATE_LIMIT_SECS),
            rate_limit: Duration::from_secs(RATE_LIMIT_SECS),
        }
    }
}

/// One CVE entry as returned by the API. `payload` is the full `cve`
/// object, stored verbatim on disk.
#[derive(Debug, Clone)]
pub struct Record {
    pub id: String,
    pub last_modified: String,
    pub payload: serde_json::Value,
}

/// One step of the fetch sequence. Malformed entries are reported and
/// skipped rather than failing the whole fetch.
#[derive(Debug)]
pub enum FetchEvent {
    Record(Record),
    Malformed { offset: u64, reason: String },
}

#[derive(Deserialize)]
struct ApiPage {
    #[serde(rename = "totalResults")]
    total_results: u64,
    #[serde(default)]
    vulnerabilities: Vec<serde_json::Value>,
}

/// Drives the paginated CVE endpoint for one window.
pub struct PageFetcher<B: HttpBackend, S: Sleeper> {
    backend: B,
    sleeper: S,
    retry: RetryPolicy,
    base_url: String,
    // Lives on the fetcher, not the stream: the mandated pause applies
    // between consecutive requests even across window boundaries.
    requests_issued: Cell<u64>,
}

impl PageFetcher<NvdHttpClient, ThreadSleeper> {
    pub fn new() -> Self {
        Self::with_backend(NvdHttpClient::new(), ThreadSleeper, RetryPolicy::default())
    }
}

impl Default for PageFetcher<NvdHttpClient, ThreadSleeper> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: HttpBackend, S: Sleeper> PageFetcher<B, S> {
    pub fn with_backend(backend: B, sleeper: S, retry: RetryPolicy) -> Self {
        Self {
            backend,
            sleeper,
            retry,
            base_url: BASE_URL.to_string(),
            requests_issued: Cell::new(0),
        }
    }

    /// Lazy, finite, non-restartable sequence of fetch events for the
    /// window. Each `next()` may block on network I/O and on the
    /// mandated inter-request delay.
    pub fn fetch_all(&self, window: SyncWindow) -> RecordStream<'_, B, S> {
        RecordStream {
            fetcher: self,
            window,
            start_index: 0,
            total_results: None,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    fn page_url(&self, window: &SyncWindow, start_index: u64) -> String {
        format!(
            "{}?lastModStartDate={}&lastModEndDate={}&resultsPerPage={}&startIndex={}",
            self.base_url,
            api_datetime(&window.start),
            api_datetime(&window.end),
            RESULTS_PER_PAGE,
            start_index
        )
    }
}

fn is_transient(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

pub struct RecordStream<'a, B: HttpBackend, S: Sleeper> {
    fetcher: &'a PageFetcher<B, S>,
    window: SyncWindow,
    start_index: u64,
    total_results: Option<u64>,
    buffer: VecDeque<FetchEvent>,
    done: bool,
}

impl<B: HttpBackend, S: Sleeper> RecordStream<'_, B, S> {
    /// `totalResults` as reported by the first page, once one has been
    /// fetched.
    pub fn total_results(&self) -> Option<u64> {
        self.total_results
    }

    /// Fetch the page at the current start index, retrying transient
    /// failures per the retry policy.
    fn fetch_page(&mut self) -> crate::Result<ApiPage> {
        let url = self.fetcher.page_url(&self.window, self.start_index);
        let policy = &self.fetcher.retry;
        let mut attempt = 1;

        loop {
            let issued = self.fetcher.requests_issued.get();
            if issued > 0 && attempt == 1 {
                self.fetcher.sleeper.sleep(policy.rate_limit);
            }

            debug!("requesting {}", url);
            self.fetcher.requests_issued.set(issued + 1);

            let failure = match self.fetcher.backend.get(&url) {
                Ok(response) if response.status == 200 => {
                    return serde_json::from_str(&response.body).map_err(|e| {
                        crate::NvdMirrorError::FetchProtocol {
                            window: self.window.to_string(),
                            offset: self.start_index,
                            detail: format!("malformed response body: {}", e),
                        }
                    });
                }
                Ok(response) if is_transient(response.status) => {
                    format!("API response: {}", response.status)
                }
                Ok(response) => {
                    return Err(crate::NvdMirrorError::FetchProtocol {
                        window: self.window.to_string(),
                        offset: self.start_index,
                        detail: format!("API response: {}", response.status),
                    });
                }
                Err(e) => format!("transport error: {}", e),
            };

            warn!(
                "transient failure at offset {} (attempt {}): {}",
                self.start_index, attempt, failure
            );

            if attempt >= policy.max_attempts {
                return Err(crate::NvdMirrorError::FetchExhausted {
                    window: self.window.to_string(),
                    offset: self.start_index,
                    attempts: attempt,
                    detail: failure,
                });
            }

            self.fetcher.sleeper.sleep(policy.backoff_delay(attempt));
            attempt += 1;
        }
    }

    fn buffer_page(&mut self, page: ApiPage) {
        for (i, entry) in page.vulnerabilities.iter().enumerate() {
            let offset = self.start_index + i as u64;
            let cve = match entry.get("cve") {
                Some(cve) => cve,
                None => {
                    self.buffer.push_back(FetchEvent::Malformed {
                        offset,
                        reason: "entry has no cve object".to_string(),
                    });
                    continue;
                }
            };
            let id = cve.get("id").and_then(|v| v.as_str());
            let last_modified = cve.get("lastModified").and_then(|v| v.as_str());
            match (id, last_modified) {
                (Some(id), Some(last_modified)) => {
                    self.buffer.push_back(FetchEvent::Record(Record {
                        id: id.to_string(),
                        last_modified: last_modified.to_string(),
                        payload: cve.clone(),
                    }));
                }
                _ => {
                    self.buffer.push_back(FetchEvent::Malformed {
                        offset,
                        reason: "entry is missing id or lastModified".to_string(),
                    });
                }
            }
        }
    }
}

impl<B: HttpBackend, S: Sleeper> Iterator for RecordStream<'_, B, S> {
    type Item = crate::Result<FetchEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.buffer.pop_front() {
                return Some(Ok(event));
            }
            if self.done {
                return None;
            }

            // The first page's totalResults bounds the whole walk; a value
            // that drifts on a later page is warned about, not trusted.
            if let Some(total) = self.total_results {
                if self.start_index >= total {
                    self.done = true;
                    return None;
                }
            }

            let page = match self.fetch_page() {
                Ok(page) => page,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };

            match self.total_results {
                None => {
                    self.total_results = Some(page.total_results);
                    if page.total_results == 0 {
                        debug!("no new updates from NVD");
                        self.done = true;
                        return None;
                    }
                }
                Some(total) if total != page.total_results => {
                    warn!(
                        "totalResults drifted mid-pagination ({} -> {}); \
                         records modified after the window end are deferred to the next pass",
                        total, page.total_results
                    );
                }
                Some(_) => {}
            }

            self.buffer_page(page);
            self.start_index += RESULTS_PER_PAGE;
        }
    }
}
