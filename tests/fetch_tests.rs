use nvd_mirror::sync::fetch::{HttpBackend, HttpResponse, PageFetcher, RetryPolicy, Sleeper};
use nvd_mirror::sync::{parse_datetime, FetchEvent, SyncWindow};
use nvd_mirror::NvdMirrorError;
use serde_json::json;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

enum Script {
    Status(u16, String),
    NetworkError,
}

/// Replays a fixed sequence of responses and records every requested URL.
struct ScriptedBackend {
    script: RefCell<VecDeque<Script>>,
    urls: Rc<RefCell<Vec<String>>>,
}

impl ScriptedBackend {
    fn new(script: Vec<Script>) -> (Self, Rc<RefCell<Vec<String>>>) {
        let urls = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                script: RefCell::new(script.into()),
                urls: Rc::clone(&urls),
            },
            urls,
        )
    }
}

impl HttpBackend for ScriptedBackend {
    fn get(&self, url: &str) -> Result<HttpResponse, Box<dyn std::error::Error + Send + Sync>> {
        self.urls.borrow_mut().push(url.to_string());
        match self.script.borrow_mut().pop_front().expect("unexpected extra request") {
            Script::Status(status, body) => Ok(HttpResponse { status, body }),
            Script::NetworkError => Err("connection reset".into()),
        }
    }
}

/// Fake clock: records requested delays without sleeping.
struct RecordingSleeper {
    sleeps: Rc<RefCell<Vec<Duration>>>,
}

impl RecordingSleeper {
    fn new() -> (Self, Rc<RefCell<Vec<Duration>>>) {
        let sleeps = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                sleeps: Rc::clone(&sleeps),
            },
            sleeps,
        )
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
    }
}

fn test_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_secs(6),
        rate_limit: Duration::from_secs(6),
    }
}

fn test_window() -> SyncWindow {
    SyncWindow {
        start: parse_datetime("2023-10-17T20:43:40.507").unwrap(),
        end: parse_datetime("2023-10-17T21:32:45.909885").unwrap(),
    }
}

fn entry(id: &str) -> serde_json::Value {
    json!({"cve": {"id": id, "lastModified": "2023-10-17T21:00:00.000"}})
}

fn page_body(total: u64, first: usize, count: usize) -> String {
    let vulnerabilities: Vec<_> = (first..first + count)
        .map(|i| entry(&format!("CVE-2024-{:05}", i)))
        .collect();
    json!({"totalResults": total, "vulnerabilities": vulnerabilities}).to_string()
}

fn fetcher_with(
    script: Vec<Script>,
) -> (
    PageFetcher<ScriptedBackend, RecordingSleeper>,
    Rc<RefCell<Vec<String>>>,
    Rc<RefCell<Vec<Duration>>>,
) {
    let (backend, urls) = ScriptedBackend::new(script);
    let (sleeper, sleeps) = RecordingSleeper::new();
    (
        PageFetcher::with_backend(backend, sleeper, test_policy()),
        urls,
        sleeps,
    )
}

#[test]
fn test_zero_results_ends_immediately() {
    let (fetcher, urls, sleeps) =
        fetcher_with(vec![Script::Status(200, page_body(0, 0, 0))]);

    let events: Vec<_> = fetcher.fetch_all(test_window()).collect();
    assert!(events.is_empty());
    assert_eq!(urls.borrow().len(), 1);
    assert!(urls.borrow()[0].contains("startIndex=0"));
    assert!(sleeps.borrow().is_empty());
}

#[test]
fn test_pagination_issues_expected_page_requests() {
    let (fetcher, urls, sleeps) = fetcher_with(vec![
        Script::Status(200, page_body(4500, 0, 2000)),
        Script::Status(200, page_body(4500, 2000, 2000)),
        Script::Status(200, page_body(4500, 4000, 500)),
    ]);

    let mut saved = 0;
    for event in fetcher.fetch_all(test_window()) {
        match event.unwrap() {
            FetchEvent::Record(_) => saved += 1,
            FetchEvent::Malformed { .. } => panic!("no malformed entries expected"),
        }
    }
    assert_eq!(saved, 4500);

    let urls = urls.borrow();
    assert_eq!(urls.len(), 3);
    assert!(urls[0].contains("resultsPerPage=2000") && urls[0].contains("startIndex=0"));
    assert!(urls[1].contains("startIndex=2000"));
    assert!(urls[2].contains("startIndex=4000"));

    // One rate-limit pause before each request after the first
    assert_eq!(
        sleeps.borrow().as_slice(),
        &[Duration::from_secs(6), Duration::from_secs(6)]
    );
}

#[test]
fn test_rate_limit_spans_window_boundaries() {
    let (fetcher, urls, sleeps) = fetcher_with(vec![
        Script::Status(200, page_body(0, 0, 0)),
        Script::Status(200, page_body(0, 0, 0)),
    ]);

    // Two windows walked through one fetcher: the second window's first
    // request must still be preceded by the inter-request pause
    let _ = fetcher.fetch_all(test_window()).count();
    let _ = fetcher.fetch_all(test_window()).count();

    assert_eq!(urls.borrow().len(), 2);
    assert_eq!(sleeps.borrow().as_slice(), &[Duration::from_secs(6)]);
}

#[test]
fn test_total_results_drift_keeps_first_bound() {
    // Page 2 claims more results arrived mid-pagination; the first
    // page's count still bounds the walk
    let (fetcher, urls, _) = fetcher_with(vec![
        Script::Status(200, page_body(4000, 0, 2000)),
        Script::Status(200, page_body(6000, 2000, 2000)),
    ]);

    let records: Vec<_> = fetcher
        .fetch_all(test_window())
        .map(|event| event.unwrap())
        .collect();

    assert_eq!(records.len(), 4000);
    assert_eq!(urls.borrow().len(), 2);
}

#[test]
fn test_window_parameters_are_encoded() {
    let (fetcher, urls, _) = fetcher_with(vec![Script::Status(200, page_body(0, 0, 0))]);

    let _ = fetcher.fetch_all(test_window()).count();

    let url = &urls.borrow()[0];
    assert!(url.contains("lastModStartDate=2023-10-17T20:43:40.507000%2B00:00"));
    assert!(url.contains("lastModEndDate=2023-10-17T21:32:45.909885%2B00:00"));
}

#[test]
fn test_transient_failure_is_retried() {
    let (fetcher, urls, sleeps) = fetcher_with(vec![
        Script::Status(200, page_body(4000, 0, 2000)),
        Script::Status(429, String::new()),
        Script::Status(200, page_body(4000, 2000, 2000)),
    ]);

    let records: Vec<_> = fetcher
        .fetch_all(test_window())
        .map(|event| event.unwrap())
        .collect();
    assert_eq!(records.len(), 4000);

    // page 2 was requested twice: once rate-limited, once after backoff
    assert_eq!(urls.borrow().len(), 3);
    assert_eq!(
        sleeps.borrow().as_slice(),
        &[Duration::from_secs(6), Duration::from_secs(6)]
    );
}

#[test]
fn test_network_error_is_transient() {
    let (fetcher, urls, _) = fetcher_with(vec![
        Script::NetworkError,
        Script::Status(200, page_body(0, 0, 0)),
    ]);

    let events: Vec<_> = fetcher.fetch_all(test_window()).collect();
    assert!(events.is_empty());
    assert_eq!(urls.borrow().len(), 2);
}

#[test]
fn test_retries_exhausted() {
    let (fetcher, urls, sleeps) = fetcher_with(vec![
        Script::Status(429, String::new()),
        Script::Status(503, String::new()),
        Script::Status(429, String::new()),
    ]);

    let mut stream = fetcher.fetch_all(test_window());
    let err = stream.next().unwrap().unwrap_err();
    assert!(matches!(
        err,
        NvdMirrorError::FetchExhausted {
            offset: 0,
            attempts: 3,
            ..
        }
    ));
    assert!(stream.next().is_none());

    assert_eq!(urls.borrow().len(), 3);
    // Exponential backoff between attempts
    assert_eq!(
        sleeps.borrow().as_slice(),
        &[Duration::from_secs(6), Duration::from_secs(12)]
    );
}

#[test]
fn test_client_error_fails_immediately() {
    let (fetcher, urls, sleeps) = fetcher_with(vec![Script::Status(404, String::new())]);

    let mut stream = fetcher.fetch_all(test_window());
    let err = stream.next().unwrap().unwrap_err();
    match err {
        NvdMirrorError::FetchProtocol { offset, detail, .. } => {
            assert_eq!(offset, 0);
            assert!(detail.contains("404"));
        }
        other => panic!("expected FetchProtocol, got {:?}", other),
    }

    assert_eq!(urls.borrow().len(), 1);
    assert!(sleeps.borrow().is_empty());
}

#[test]
fn test_malformed_body_fails_immediately() {
    let (fetcher, urls, _) =
        fetcher_with(vec![Script::Status(200, "not json at all".to_string())]);

    let mut stream = fetcher.fetch_all(test_window());
    let err = stream.next().unwrap().unwrap_err();
    assert!(matches!(err, NvdMirrorError::FetchProtocol { .. }));
    assert_eq!(urls.borrow().len(), 1);
}

#[test]
fn test_malformed_entries_are_skipped_not_fatal() {
    let body = json!({
        "totalResults": 3,
        "vulnerabilities": [
            entry("CVE-2024-00001"),
            {"cve": {"id": "CVE-2024-00002"}},
            {"unexpected": "shape"},
        ]
    })
    .to_string();
    let (fetcher, _, _) = fetcher_with(vec![Script::Status(200, body)]);

    let mut saved = Vec::new();
    let mut skipped = Vec::new();
    for event in fetcher.fetch_all(test_window()) {
        match event.unwrap() {
            FetchEvent::Record(record) => saved.push(record.id),
            FetchEvent::Malformed { offset, .. } => skipped.push(offset),
        }
    }

    assert_eq!(saved, vec!["CVE-2024-00001"]);
    assert_eq!(skipped, vec![1, 2]);
}
