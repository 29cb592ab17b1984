#![allow(dead_code)]

pub mod test_server {
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }
}

pub mod client {
    use brrtstack::server::{ResponseSnapshot, RouterService};
    use brrtstack::{Request, Router, RouterConfig};
    use http::Method;

    /// A router that ignores `BRRTS_*` variables of the test environment
    pub fn router() -> Router {
        Router::with_config(RouterConfig::default())
    }

    /// Dispatch through the service adapter and wait for the response to end
    pub fn send(router: &Router, method: Method, target: &str) -> ResponseSnapshot {
        RouterService::new(router.clone()).respond(&Request::new(method, target))
    }

    pub fn send_request(router: &Router, req: &Request) -> ResponseSnapshot {
        RouterService::new(router.clone()).respond(req)
    }

    pub fn get(router: &Router, target: &str) -> ResponseSnapshot {
        send(router, Method::GET, target)
    }
}

pub mod log_capture {
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    /// In-memory writer for a thread-local test subscriber
    #[derive(Clone, Default)]
    pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }

        /// Parsed JSON lines
        pub fn events(&self) -> Vec<serde_json::Value> {
            self.contents()
                .lines()
                .filter_map(|l| serde_json::from_str(l).ok())
                .collect()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Run `f` with a JSON subscriber installed on this thread only.
    pub fn capture<R>(f: impl FnOnce() -> R) -> (R, CapturedLogs) {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing::Level::TRACE)
            .with_current_span(true)
            .with_writer(logs.clone())
            .finish();
        let result = tracing::subscriber::with_default(subscriber, f);
        (result, logs)
    }
}
