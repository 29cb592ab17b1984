//! Request/response handles and the `may_minihttp` transport adapter.

pub mod http_server;
pub mod request;
pub mod response;
pub mod service;

pub use http_server::{serve, ServerHandle};
pub use request::{HeaderVec, Request, RequestBuilder, RequestId, MAX_INLINE_HEADERS};
pub use response::{Link, Response, ResponseSnapshot};
pub use service::RouterService;
