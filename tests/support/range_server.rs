//! Mock origin that serves a byte buffer through HEAD and ranged GET.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use md5::{Digest, Md5};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const FILE_PATH: &str = "/files/data.bin";

/// Deterministic test payload.
#[must_use]
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

#[must_use]
pub fn md5_hex(content: &[u8]) -> String {
    hex::encode(Md5::digest(content))
}

#[must_use]
pub fn file_url(server: &MockServer) -> String {
    format!("{}{FILE_PATH}", server.uri())
}

/// Mounts a HEAD handler reporting `content`'s length and the given ETag.
pub async fn mount_head(server: &MockServer, content: &[u8], etag: Option<&str>) {
    let mut template = ResponseTemplate::new(200)
        .set_body_bytes(content.to_vec())
        .insert_header("Content-Length", content.len().to_string().as_str());
    if let Some(etag) = etag {
        template = template.insert_header("ETag", format!("\"{etag}\"").as_str());
    }
    Mock::given(method("HEAD"))
        .and(path(FILE_PATH))
        .respond_with(template)
        .mount(server)
        .await;
}

/// Serves `Range: bytes=a-b` requests out of a shared buffer.
///
/// Supports scripted failures per chunk offset, ignoring `Range` entirely
/// (plain 200 with the whole body), a blocking per-request delay used to
/// hold requests in flight, and an async delay for slow-origin tests.
#[derive(Clone)]
pub struct RangeResponder {
    content: Arc<Vec<u8>>,
    failures: Arc<Mutex<HashMap<u64, u32>>>,
    failure_status: u16,
    fail_all: bool,
    ignore_range: bool,
    hold: Duration,
    slow: Duration,
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    requests: Arc<AtomicUsize>,
}

impl RangeResponder {
    pub fn new(content: Vec<u8>) -> Self {
        Self {
            content: Arc::new(content),
            failures: Arc::new(Mutex::new(HashMap::new())),
            failure_status: 503,
            fail_all: false,
            ignore_range: false,
            hold: Duration::ZERO,
            slow: Duration::ZERO,
            current: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fails the first `times` requests for the chunk starting at `offset`.
    pub fn fail_chunk(self, offset: u64, times: u32) -> Self {
        self.failures.lock().unwrap().insert(offset, times);
        self
    }

    /// Fails every request.
    pub fn fail_all(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Fails every request for the chunk starting at `offset`.
    pub fn fail_chunk_always(self, offset: u64) -> Self {
        self.fail_chunk(offset, u32::MAX)
    }

    pub fn ignore_range(mut self) -> Self {
        self.ignore_range = true;
        self
    }

    /// Blocks the responder thread for `hold` on every request.
    ///
    /// wiremock's `Respond` is synchronous, so this is what keeps a request
    /// counted as in flight while others arrive.
    pub fn hold(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    /// Delays every successful response without blocking the server.
    ///
    /// Scripted failures are still answered immediately.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.slow = delay;
        self
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub async fn mount(&self, server: &MockServer) {
        Mock::given(method("GET"))
            .and(path(FILE_PATH))
            .respond_with(self.clone())
            .mount(server)
            .await;
    }

    fn should_fail(&self, offset: u64) -> bool {
        if self.fail_all {
            return true;
        }
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&offset) {
            Some(remaining) if *remaining > 0 => {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                true
            }
            _ => false,
        }
    }
}

fn parse_range(request: &Request) -> Option<(u64, u64)> {
    let value = request.headers.get("range")?.to_str().ok()?;
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(in_flight, Ordering::SeqCst);
        if !self.hold.is_zero() {
            std::thread::sleep(self.hold);
        }
        self.current.fetch_sub(1, Ordering::SeqCst);

        let Some((start, end)) = parse_range(request) else {
            return ResponseTemplate::new(400);
        };

        if self.should_fail(start) {
            return ResponseTemplate::new(self.failure_status);
        }

        let template = if self.ignore_range {
            ResponseTemplate::new(200).set_body_bytes(self.content.to_vec())
        } else {
            let last = self.content.len() as u64 - 1;
            let end = end.min(last);
            let slice = self.content[start as usize..=end as usize].to_vec();
            ResponseTemplate::new(206)
                .insert_header(
                    "Content-Range",
                    format!("bytes {start}-{end}/{}", self.content.len()).as_str(),
                )
                .set_body_bytes(slice)
        };

        if self.slow.is_zero() {
            template
        } else {
            template.set_delay(self.slow)
        }
    }
}
