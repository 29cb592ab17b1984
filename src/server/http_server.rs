use super::service::RouterService;
use crate::router::Router;
use may::coroutine::JoinHandle;
use may_minihttp::HttpServerWithHeaders;
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;
use tracing::info;

/// Handle to a running HTTP server
pub struct ServerHandle {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl ServerHandle {
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the server to be ready to accept connections
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` if the server doesn't accept a connection within
    /// ~250ms (50 attempts × 5ms).
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Cancel the server coroutine and wait for it to finish
    pub fn stop(self) {
        // SAFETY: cancel() is unsafe in may; the handle is valid (we own it)
        // and cancellation is the intended way to stop the accept loop.
        unsafe {
            self.handle.coroutine().cancel();
        }
        let _ = self.handle.join();
        info!(addr = %self.addr, "Server stopped");
    }

    /// Block until the server coroutine completes
    ///
    /// # Errors
    ///
    /// Returns an error if the server coroutine panicked.
    pub fn join(self) -> std::thread::Result<()> {
        self.handle.join()
    }
}

/// Serve `router` on `addr`.
///
/// Uses 32 max headers per request to handle API gateway/proxy traffic.
///
/// # Errors
///
/// Returns an error if the address is invalid or the port cannot be bound.
pub fn serve<A: ToSocketAddrs>(router: Router, addr: A) -> io::Result<ServerHandle> {
    let addr = addr
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid address"))?;
    let handle = HttpServerWithHeaders::<_, 32>(RouterService::new(router)).start(addr)?;
    info!(addr = %addr, "Server listening");
    Ok(ServerHandle { addr, handle })
}
