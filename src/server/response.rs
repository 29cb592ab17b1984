use crate::error::status_reason;
use crate::server::request::{HeaderVec, Request};
use http::Method;
use may::sync::mpsc;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const TEXT_HTML: &str = "text/html; charset=utf-8";
const APPLICATION_JSON: &str = "application/json; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

/// Everything written to a response, captured when it ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseSnapshot {
    /// HTTP status code
    pub status: u16,
    /// Response headers in insertion order; a name may repeat
    #[serde(skip_serializing)]
    pub headers: HeaderVec,
    /// Response body bytes
    pub body: Vec<u8>,
    /// Whether `end` was called
    pub ended: bool,
}

impl ResponseSnapshot {
    /// First value of a header (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body as text, lossy
    #[must_use]
    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// One entry of a `Link` header: a target URL plus its parameters.
///
/// Parameter values are quoted unless the name ends in `*` (RFC 8187
/// extended values).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    url: String,
    params: Vec<(String, String)>,
}

impl Link {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: Vec::new(),
        }
    }

    /// Add a `name=value` parameter such as `rel`
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    fn render(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.url);
        out.push('>');
        for (name, value) in &self.params {
            out.push_str("; ");
            out.push_str(name);
            out.push('=');
            if name.ends_with('*') {
                out.push_str(value);
            } else {
                out.push('"');
                out.push_str(value);
                out.push('"');
            }
        }
    }
}

impl From<&str> for Link {
    fn from(url: &str) -> Self {
        Link::new(url)
    }
}

impl From<String> for Link {
    fn from(url: String) -> Self {
        Link::new(url)
    }
}

struct ResponseState {
    status: u16,
    headers: HeaderVec,
    body: Vec<u8>,
    ended: bool,
}

struct ResponseInner {
    state: Mutex<ResponseState>,
    completion: Mutex<Option<mpsc::Sender<ResponseSnapshot>>>,
}

/// Shared handle to the response under construction.
///
/// Headers and status can be changed until [`end`](Self::end) is called; after
/// that every write is ignored and reported with a `false` return.
#[derive(Clone)]
pub struct Response {
    inner: Arc<ResponseInner>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    /// A `200 OK` response with no headers
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A response that publishes its snapshot on the returned channel when it
    /// ends. The transport adapter waits on this.
    #[must_use]
    pub fn with_completion() -> (Self, mpsc::Receiver<ResponseSnapshot>) {
        let (tx, rx) = mpsc::channel();
        (Self::build(Some(tx)), rx)
    }

    fn build(completion: Option<mpsc::Sender<ResponseSnapshot>>) -> Self {
        Self {
            inner: Arc::new(ResponseInner {
                state: Mutex::new(ResponseState {
                    status: 200,
                    headers: HeaderVec::new(),
                    body: Vec::new(),
                    ended: false,
                }),
                completion: Mutex::new(completion),
            }),
        }
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.inner.state.lock().status
    }

    /// Set the status code; returns `false` once the response has ended
    pub fn set_status(&self, status: u16) -> bool {
        self.write(|s| s.status = status)
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.inner.state.lock().ended
    }

    /// First value of a header (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<String> {
        self.inner
            .state
            .lock()
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    /// All values of a header, in insertion order
    #[must_use]
    pub fn header_values(&self, name: &str) -> Vec<String> {
        self.inner
            .state
            .lock()
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Replace every value of a header
    pub fn set_header(&self, name: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        self.write(|s| {
            s.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
            s.headers.push((Arc::from(name), value));
        })
    }

    /// Add a value, keeping existing ones (e.g. several `set-cookie`)
    pub fn append_header(&self, name: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        self.write(|s| s.headers.push((Arc::from(name), value)))
    }

    pub fn remove_header(&self, name: &str) -> bool {
        self.write(|s| s.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name)))
    }

    /// Append bytes to the body without ending the response
    pub fn write_body(&self, chunk: &[u8]) -> bool {
        self.write(|s| s.body.extend_from_slice(chunk))
    }

    /// End the response with whatever has been written so far.
    ///
    /// Meaningful once: later calls return `false` and change nothing.
    pub fn end(&self) -> bool {
        self.finish(None)
    }

    /// Replace the body and end the response
    pub fn end_with(&self, body: impl Into<Vec<u8>>) -> bool {
        self.finish(Some(body.into()))
    }

    /// Send a text body, defaulting the content type to HTML.
    pub fn send(&self, body: &str) -> bool {
        self.send_typed(TEXT_HTML, body.as_bytes().to_vec())
    }

    /// Send a binary body, defaulting the content type to octet-stream.
    pub fn send_bytes(&self, body: Vec<u8>) -> bool {
        self.send_typed(OCTET_STREAM, body)
    }

    /// Set the status and send its reason phrase as a plain text body.
    pub fn send_status(&self, status: u16) -> bool {
        if !self.set_status(status) {
            return false;
        }
        self.send_typed(TEXT_PLAIN, status_reason(status).as_bytes().to_vec())
    }

    /// Serialize `value` as the JSON body.
    ///
    /// A serialization failure ends the response with a 500.
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> bool {
        match serde_json::to_vec(value) {
            Ok(body) => {
                self.set_header("content-type", APPLICATION_JSON);
                self.send_typed(APPLICATION_JSON, body)
            }
            Err(e) => {
                warn!(error = %e, "JSON response serialization failed");
                self.plain(500, status_reason(500))
            }
        }
    }

    /// Append entries to the `Link` header, after any existing value.
    pub fn links<I>(&self, links: I) -> bool
    where
        I: IntoIterator,
        I::Item: Into<Link>,
    {
        let mut value = self.header("link").unwrap_or_default();
        for link in links {
            if !value.is_empty() {
                value.push_str(", ");
            }
            link.into().render(&mut value);
        }
        if value.is_empty() {
            return !self.is_ended();
        }
        self.set_header("link", value)
    }

    /// Add comma-separated field names to the `Vary` header.
    ///
    /// Names already present (case-insensitive) are skipped and `*` absorbs
    /// everything else.
    pub fn vary(&self, fields: &str) -> bool {
        let fields: Vec<&str> = fields
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect();
        if fields.is_empty() {
            return !self.is_ended();
        }

        let current = self.header("vary").unwrap_or_default();
        if current.trim() == "*" {
            return !self.is_ended();
        }
        if fields.contains(&"*") {
            return self.set_header("vary", "*");
        }

        let mut names: Vec<String> = current
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        for field in fields {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(field)) {
                names.push(field.to_string());
            }
        }
        self.set_header("vary", names.join(", "))
    }

    /// Set the `Location` header. `"back"` means the request's referrer, or
    /// `/` without one.
    pub fn location(&self, req: &Request, url: &str) -> bool {
        let url = if url == "back" {
            req.header("referrer")
                .or_else(|| req.header("referer"))
                .unwrap_or("/")
        } else {
            url
        };
        self.set_header("location", url)
    }

    /// Redirect with `302 Found`.
    pub fn redirect(&self, req: &Request, url: &str) -> bool {
        self.redirect_with_status(req, 302, url)
    }

    /// Set `Location` and end with a plain text `"{reason}. Redirecting to
    /// {url}"` body; `HEAD` requests get the headers only.
    pub fn redirect_with_status(&self, req: &Request, status: u16, url: &str) -> bool {
        if !self.location(req, url) {
            return false;
        }
        let address = self.header("location").unwrap_or_default();
        let body = format!(
            "{}. Redirecting to {}",
            status_reason(status),
            encode_uri(&address)
        );
        let written = self.write(|s| {
            s.status = status;
            replace_header(&mut s.headers, "content-type", TEXT_PLAIN.to_string());
            replace_header(&mut s.headers, "content-length", body.len().to_string());
        });
        let body = if *req.method() == Method::HEAD {
            Vec::new()
        } else {
            body.into_bytes()
        };
        written && self.finish(Some(body))
    }

    /// Set status and content type and end with a plain text body. Used by the
    /// dispatcher's end-of-stack policy.
    pub(crate) fn plain(&self, status: u16, body: &str) -> bool {
        let written = self.write(|s| {
            s.status = status;
            s.headers.retain(|(k, _)| !k.eq_ignore_ascii_case("content-type"));
            s.headers.push((Arc::from("content-type"), TEXT_PLAIN.to_string()));
        });
        written && self.finish(Some(body.as_bytes().to_vec()))
    }

    fn send_typed(&self, default_type: &str, mut body: Vec<u8>) -> bool {
        let written = self.write(|s| {
            if !s.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-type")) {
                s.headers
                    .push((Arc::from("content-type"), default_type.to_string()));
            }
            if s.status == 204 || s.status == 304 {
                s.headers.retain(|(k, _)| {
                    !k.eq_ignore_ascii_case("content-type")
                        && !k.eq_ignore_ascii_case("content-length")
                });
                body.clear();
            } else {
                s.headers.retain(|(k, _)| !k.eq_ignore_ascii_case("content-length"));
                s.headers
                    .push((Arc::from("content-length"), body.len().to_string()));
            }
        });
        written && self.finish(Some(body))
    }

    /// Current state, whether or not the response has ended
    #[must_use]
    pub fn snapshot(&self) -> ResponseSnapshot {
        let s = self.inner.state.lock();
        ResponseSnapshot {
            status: s.status,
            headers: s.headers.clone(),
            body: s.body.clone(),
            ended: s.ended,
        }
    }

    fn write(&self, f: impl FnOnce(&mut ResponseState)) -> bool {
        let mut state = self.inner.state.lock();
        if state.ended {
            debug!("Write to ended response ignored");
            return false;
        }
        f(&mut state);
        true
    }

    fn finish(&self, body: Option<Vec<u8>>) -> bool {
        let snapshot = {
            let mut s = self.inner.state.lock();
            if s.ended {
                debug!(status = s.status, "Response already ended");
                return false;
            }
            if let Some(body) = body {
                s.body = body;
            }
            s.ended = true;
            ResponseSnapshot {
                status: s.status,
                headers: s.headers.clone(),
                body: s.body.clone(),
                ended: true,
            }
        };

        if let Some(tx) = self.inner.completion.lock().take() {
            // The receiver may already be gone (client disconnected).
            let _ = tx.send(snapshot);
        }
        true
    }
}

fn replace_header(headers: &mut HeaderVec, name: &str, value: String) {
    headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    headers.push((Arc::from(name), value));
}

/// Percent-encode everything except URI reserved and unreserved characters.
fn encode_uri(uri: &str) -> String {
    const KEEP: &[u8] = b";,/?:@&=+$-_.!~*'()#";
    let mut out = String::with_capacity(uri.len());
    for &b in uri.as_bytes() {
        if b.is_ascii_alphanumeric() || KEEP.contains(&b) {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.inner.state.lock();
        f.debug_struct("Response")
            .field("status", &s.status)
            .field("headers", &s.headers.len())
            .field("ended", &s.ended)
            .finish()
    }
}
