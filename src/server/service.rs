use super::request::Request;
use super::response::{Response, ResponseSnapshot};
use crate::error::status_reason;
use crate::router::Router;
use dashmap::DashMap;
use http::Method;
use may_minihttp::HttpService;
use once_cell::sync::Lazy;
use std::io::{self, Read};
use std::time::Instant;
use tracing::{debug, error, warn};

/// Upper bound on distinct header lines kept for the process lifetime.
const MAX_INTERNED_HEADER_LINES: usize = 4096;

/// `may_minihttp` only accepts `&'static str` header lines. Lines are leaked
/// once and reused; the cache is bounded so per-request values cannot grow it
/// without limit.
static HEADER_LINES: Lazy<DashMap<String, &'static str>> = Lazy::new(DashMap::new);

fn intern_header_line(name: &str, value: &str) -> Option<&'static str> {
    let line = format!("{name}: {value}");
    if let Some(existing) = HEADER_LINES.get(&line) {
        return Some(*existing);
    }
    if HEADER_LINES.len() >= MAX_INTERNED_HEADER_LINES {
        return None;
    }
    let leaked: &'static str = Box::leak(line.clone().into_boxed_str());
    Some(*HEADER_LINES.entry(line).or_insert(leaked))
}

/// Runs a [`Router`] behind `may_minihttp`.
///
/// Each request is dispatched without a terminal callback, so the default
/// end-of-stack policy applies. The service then waits until the response
/// ends, which may happen on another coroutine if a handler suspended.
#[derive(Clone)]
pub struct RouterService {
    router: Router,
}

impl RouterService {
    #[must_use]
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Dispatch `req` and block until the response ends.
    ///
    /// If every handle to the response is dropped before it ends (a handler
    /// dropped its continuation), the result is a 500.
    #[must_use]
    pub fn respond(&self, req: &Request) -> ResponseSnapshot {
        let start = Instant::now();
        let (res, completion) = Response::with_completion();
        self.router.handle(req, &res, None);
        drop(res);

        match completion.recv() {
            Ok(snapshot) => {
                debug!(
                    request_id = %req.id(),
                    status = snapshot.status,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Response completed"
                );
                snapshot
            }
            Err(e) => {
                error!(
                    request_id = %req.id(),
                    method = %req.method(),
                    path = %req.path(),
                    error = %e,
                    "Response dropped without ending - handler lost its continuation"
                );
                let fallback = Response::new();
                fallback.plain(500, status_reason(500));
                fallback.snapshot()
            }
        }
    }
}

/// Convert a parsed `may_minihttp` request.
///
/// `None` when the method token is not a valid HTTP method.
fn convert_request(req: may_minihttp::Request) -> Option<Request> {
    let method = Method::from_bytes(req.method().as_bytes()).ok()?;
    let mut builder = Request::builder(method, req.path());
    for h in req.headers() {
        builder = builder.header(h.name, &String::from_utf8_lossy(h.value));
    }
    let mut body = Vec::new();
    if let Err(e) = req.body().read_to_end(&mut body) {
        warn!(error = %e, "Failed to read request body");
    }
    Some(builder.body(body).build())
}

fn write_snapshot(res: &mut may_minihttp::Response, snapshot: &ResponseSnapshot) {
    let status = if (100..1000).contains(&snapshot.status) {
        snapshot.status
    } else {
        warn!(status = snapshot.status, "Invalid status code, sending 500");
        500
    };
    res.status_code(status as usize, status_reason(status));

    for (name, value) in &snapshot.headers {
        // may_minihttp writes the length itself
        if name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        match intern_header_line(name, value) {
            Some(line) => {
                res.header(line);
            }
            None => warn!(header = %name, "Header line cache full, header dropped"),
        }
    }
    res.body_vec(snapshot.body.clone());
}

impl HttpService for RouterService {
    fn call(&mut self, req: may_minihttp::Request, res: &mut may_minihttp::Response) -> io::Result<()> {
        let request = match convert_request(req) {
            Some(r) => r,
            None => {
                res.status_code(400, status_reason(400));
                res.header("Content-Type: text/plain; charset=utf-8");
                res.body_vec(b"Bad Request".to_vec());
                return Ok(());
            }
        };
        let snapshot = self.respond(&request);
        write_snapshot(res, &snapshot);
        Ok(())
    }
}
