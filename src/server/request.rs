use crate::params::{ParamValue, Params};
use http::{Extensions, Method};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Maximum inline headers before heap allocation
/// Most requests have ≤16 headers
pub const MAX_INLINE_HEADERS: usize = 16;

/// Header storage shared by requests, responses and snapshots.
///
/// Names are `Arc<str>` so that repeated names (content-type, set-cookie)
/// clone in O(1); values are per-request data.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Query string pairs, in order of appearance
pub type QueryVec = SmallVec<[(String, String); 8]>;

/// Strongly typed request identifier backed by ULID.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct RequestId(pub ulid::Ulid);

impl RequestId {
    #[must_use]
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Reuse an upstream `x-request-id` when it is a valid ULID.
    #[must_use]
    pub fn from_header_or_new(header_value: Option<&str>) -> Self {
        header_value
            .and_then(|s| s.trim().parse::<RequestId>().ok())
            .unwrap_or_default()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s).map(RequestId)
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Split a request target into path and parsed query pairs.
#[must_use]
pub fn split_target(target: &str) -> (String, QueryVec) {
    match target.split_once('?') {
        Some((path, query)) => (
            if path.is_empty() { "/".to_string() } else { path.to_string() },
            url::form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        ),
        None => (
            if target.is_empty() { "/".to_string() } else { target.to_string() },
            QueryVec::new(),
        ),
    }
}

struct RequestInner {
    id: RequestId,
    method: Method,
    url: String,
    path: String,
    query: QueryVec,
    headers: HeaderVec,
    body: Vec<u8>,
    state: Mutex<RequestState>,
}

/// The part of a request the dispatcher rewrites as control moves between
/// records and mounted routers.
#[derive(Default)]
struct RequestState {
    params: Params,
    route_path: Option<String>,
    base_path: String,
    data: Extensions,
}

/// Shared handle to an in-flight request.
///
/// Cloning is cheap; every clone sees the same parameters and data bag, so a
/// handler can move a clone into a coroutine and keep working on it after it
/// returns.
#[derive(Clone)]
pub struct Request {
    inner: Arc<RequestInner>,
}

impl Request {
    /// Request with no headers and an empty body
    #[must_use]
    pub fn new(method: Method, target: &str) -> Self {
        Self::builder(method, target).build()
    }

    #[must_use]
    pub fn builder(method: Method, target: &str) -> RequestBuilder {
        RequestBuilder {
            method,
            target: target.to_string(),
            headers: HeaderVec::new(),
            body: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.inner.id
    }

    #[inline]
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    /// Raw request target, path plus query string
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Full request path, without the query string
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Path relative to the router currently dispatching.
    ///
    /// Equal to [`path`](Self::path) at the top level; inside a router
    /// mounted at `/api` a request for `/api/users` sees `/users`.
    #[must_use]
    pub fn route_path(&self) -> String {
        self.inner
            .state
            .lock()
            .route_path
            .clone()
            .unwrap_or_else(|| self.inner.path.clone())
    }

    /// Prefix stripped by the enclosing mounts (empty at the top level)
    #[must_use]
    pub fn base_path(&self) -> String {
        self.inner.state.lock().base_path.clone()
    }

    /// Get a header by name (case-insensitive per RFC 7230)
    #[inline]
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        &self.inner.headers
    }

    /// Get a query parameter by name
    ///
    /// Uses "last write wins" semantics: `?limit=10&limit=20` yields `20`.
    #[inline]
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.inner
            .query
            .iter()
            .rfind(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn query_pairs(&self) -> &QueryVec {
        &self.inner.query
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    /// Parameters of the record currently running
    #[must_use]
    pub fn params(&self) -> Params {
        self.inner.state.lock().params.clone()
    }

    /// A single path parameter of the record currently running
    #[must_use]
    pub fn param(&self, name: &str) -> Option<ParamValue> {
        self.inner.state.lock().params.get(name).cloned()
    }

    /// Resolve a value by name: path parameters first, then top-level
    /// fields of a JSON body, then the query string.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<String> {
        if let Some(v) = self.inner.state.lock().params.get_str(name) {
            return Some(v.to_string());
        }
        if self.is_json() {
            if let Ok(serde_json::Value::Object(map)) =
                serde_json::from_slice::<serde_json::Value>(&self.inner.body)
            {
                match map.get(name) {
                    Some(serde_json::Value::String(s)) => return Some(s.clone()),
                    Some(serde_json::Value::Null) | None => {}
                    Some(other) => return Some(other.to_string()),
                }
            }
        }
        self.query(name).map(str::to_string)
    }

    fn is_json(&self) -> bool {
        self.header("content-type")
            .map(|ct| ct.to_ascii_lowercase().starts_with("application/json"))
            .unwrap_or(false)
    }

    /// Host name from the `Host` header, port removed; bracketed IPv6
    /// literals are kept whole.
    #[must_use]
    pub fn hostname(&self) -> Option<&str> {
        let host = self.header("host")?.trim();
        if host.is_empty() {
            return None;
        }
        let offset = if host.starts_with('[') {
            host.find(']')? + 1
        } else {
            0
        };
        match host[offset..].find(':') {
            Some(i) => Some(&host[..offset + i]),
            None => Some(host),
        }
    }

    /// `X-Requested-With: XMLHttpRequest`
    #[must_use]
    pub fn xhr(&self) -> bool {
        self.header("x-requested-with")
            .is_some_and(|v| v.eq_ignore_ascii_case("xmlhttprequest"))
    }

    /// Store a value in the request's data bag, returning the previous value
    /// of the same type.
    pub fn insert_data<T: Clone + Send + Sync + 'static>(&self, value: T) -> Option<T> {
        self.inner.state.lock().data.insert(value)
    }

    /// A copy of the data bag value of type `T`
    #[must_use]
    pub fn data<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.inner.state.lock().data.get::<T>().cloned()
    }

    pub fn remove_data<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.inner.state.lock().data.remove::<T>()
    }

    /// Run `f` against the data bag value of type `T`, creating it with
    /// `Default` first if absent.
    pub fn with_data<T, R>(&self, f: impl FnOnce(&mut T) -> R) -> R
    where
        T: Clone + Default + Send + Sync + 'static,
    {
        let mut state = self.inner.state.lock();
        f(state.data.get_or_insert_default::<T>())
    }

    pub(crate) fn set_scope(&self, params: Params, route_path: &str, base_path: &str) {
        let mut state = self.inner.state.lock();
        state.params = params;
        if state.route_path.as_deref() != Some(route_path) {
            state.route_path = Some(route_path.to_string());
        }
        if state.base_path != base_path {
            state.base_path = base_path.to_string();
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.inner.id)
            .field("method", &self.inner.method)
            .field("url", &self.inner.url)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Request`], used by the transport adapter and by tests.
pub struct RequestBuilder {
    method: Method,
    target: String,
    headers: HeaderVec,
    body: Vec<u8>,
}

impl RequestBuilder {
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .push((Arc::from(name.to_ascii_lowercase()), value.to_string()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn build(self) -> Request {
        let id = RequestId::from_header_or_new(
            self.headers
                .iter()
                .find(|(k, _)| k.as_ref() == "x-request-id")
                .map(|(_, v)| v.as_str()),
        );
        let (path, query) = split_target(&self.target);
        Request {
            inner: Arc::new(RequestInner {
                id,
                method: self.method,
                url: self.target,
                path,
                query,
                headers: self.headers,
                body: self.body,
                state: Mutex::new(RequestState::default()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_split_target() {
        let (path, query) = split_target("/p?x=1&y=a%20b");
        assert_eq!(path, "/p");
        assert_eq!(query[0], ("x".to_string(), "1".to_string()));
        assert_eq!(query[1], ("y".to_string(), "a b".to_string()));

        let (path, query) = split_target("/plain");
        assert_eq!(path, "/plain");
        assert!(query.is_empty());
    }

    #[test]
    fn test_request_id_from_header() {
        let upstream = RequestId::new().to_string();
        let req = Request::builder(Method::GET, "/")
            .header("X-Request-Id", &upstream)
            .build();
        assert_eq!(req.id().to_string(), upstream);

        let req = Request::builder(Method::GET, "/")
            .header("x-request-id", "not-a-ulid")
            .build();
        assert_ne!(req.id().to_string(), "not-a-ulid");
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = Request::builder(Method::GET, "/")
            .header("Content-Type", "text/plain")
            .build();
        assert_eq!(req.header("content-type"), Some("text/plain"));
        assert_eq!(req.header("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn test_hostname() {
        let host = |h: &str| {
            Request::builder(Method::GET, "/")
                .header("host", h)
                .build()
                .hostname()
                .map(str::to_string)
        };
        assert_eq!(host("example.com:8080").as_deref(), Some("example.com"));
        assert_eq!(host("example.com").as_deref(), Some("example.com"));
        assert_eq!(host("[::1]:3000").as_deref(), Some("[::1]"));
        assert_eq!(host("[::1]").as_deref(), Some("[::1]"));
        assert_eq!(host("[::1"), None);
        assert!(Request::new(Method::GET, "/").hostname().is_none());
    }

    #[test]
    fn test_xhr() {
        let req = Request::builder(Method::GET, "/")
            .header("X-Requested-With", "XMLHttpRequest")
            .build();
        assert!(req.xhr());
        assert!(!Request::new(Method::GET, "/").xhr());
    }

    #[test]
    fn test_lookup_order() {
        let req = Request::builder(Method::POST, "/u/7?id=query&q=1")
            .header("content-type", "application/json")
            .body(r#"{"id": "body", "n": 3}"#)
            .build();
        assert_eq!(req.lookup("id").as_deref(), Some("body"));
        assert_eq!(req.lookup("n").as_deref(), Some("3"));
        assert_eq!(req.lookup("q").as_deref(), Some("1"));

        let mut params = Params::new();
        params.push(Arc::from("id"), ParamValue::Decoded("7".into()));
        req.set_scope(params, "/u/7", "");
        assert_eq!(req.lookup("id").as_deref(), Some("7"));
        assert!(req.lookup("missing").is_none());
    }

    #[test]
    fn test_data_bag_is_shared_between_clones() {
        #[derive(Clone, Default, Debug, PartialEq)]
        struct Seen(Vec<&'static str>);

        let req = Request::new(Method::GET, "/");
        let other = req.clone();
        req.with_data::<Seen, _>(|s| s.0.push("a"));
        other.with_data::<Seen, _>(|s| s.0.push("b"));
        assert_eq!(req.data::<Seen>(), Some(Seen(vec!["a", "b"])));
        assert_eq!(req.remove_data::<Seen>(), Some(Seen(vec!["a", "b"])));
        assert!(other.data::<Seen>().is_none());
    }

    #[test]
    fn test_route_path_defaults_to_path() {
        let req = Request::new(Method::GET, "/api/users?x=1");
        assert_eq!(req.route_path(), "/api/users");
        assert_eq!(req.base_path(), "");
        req.set_scope(Params::new(), "/users", "/api");
        assert_eq!(req.route_path(), "/users");
        assert_eq!(req.base_path(), "/api");
        assert_eq!(req.path(), "/api/users");
    }
}
