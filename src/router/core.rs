use crate::dispatcher::{Dispatch, Next};
use crate::error::{HttpError, MountConflictReason, RouterError};
use crate::handler::{Callback, HandlerResult, Terminal};
use crate::params::{ParamHookRegistry, ParamValue};
use crate::pattern::{CompileOptions, PathPattern, PathSpec};
use crate::runtime_config::RouterConfig;
use crate::server::{Request, Response};
use crate::stack::{HandlerStack, LayerInfo};
use arc_swap::ArcSwap;
use http::Method;
use parking_lot::Mutex;
use regex::Regex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Serializes every mount operation so that cycle checks see a stable graph.
static MOUNT_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Paths accepted by the registration methods.
pub trait IntoPathSpecs {
    fn into_path_specs(self) -> Vec<PathSpec>;
}

impl IntoPathSpecs for &str {
    fn into_path_specs(self) -> Vec<PathSpec> {
        vec![PathSpec::from(self)]
    }
}

impl IntoPathSpecs for String {
    fn into_path_specs(self) -> Vec<PathSpec> {
        vec![PathSpec::from(self)]
    }
}

impl IntoPathSpecs for &String {
    fn into_path_specs(self) -> Vec<PathSpec> {
        vec![PathSpec::from(self)]
    }
}

impl IntoPathSpecs for Regex {
    fn into_path_specs(self) -> Vec<PathSpec> {
        vec![PathSpec::Regex(self)]
    }
}

impl IntoPathSpecs for PathSpec {
    fn into_path_specs(self) -> Vec<PathSpec> {
        vec![self]
    }
}

impl<T: Into<PathSpec>> IntoPathSpecs for Vec<T> {
    fn into_path_specs(self) -> Vec<PathSpec> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<PathSpec>, const N: usize> IntoPathSpecs for [T; N] {
    fn into_path_specs(self) -> Vec<PathSpec> {
        self.into_iter().map(Into::into).collect()
    }
}

struct RouterInner {
    stack: ArcSwap<HandlerStack>,
    hooks: ArcSwap<ParamHookRegistry>,
    config: RouterConfig,
    mount_path: Mutex<Option<String>>,
    registration: Mutex<()>,
    serving: AtomicBool,
}

/// A middleware dispatch engine.
///
/// Cheap to clone; clones share the same stack and registry. Registration and
/// dispatch may overlap: every request runs on the stack snapshot that was
/// current when it entered the router.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// A router configured from the environment (`BRRTS_*`)
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RouterConfig::from_env())
    }

    #[must_use]
    pub fn with_config(config: RouterConfig) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                stack: ArcSwap::from_pointee(HandlerStack::new()),
                hooks: ArcSwap::from_pointee(ParamHookRegistry::new()),
                config,
                mount_path: Mutex::new(None),
                registration: Mutex::new(()),
                serving: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    /// Path this router is mounted at, if it is mounted
    #[must_use]
    pub fn mount_path(&self) -> Option<String> {
        self.inner.mount_path.lock().clone()
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.inner.mount_path.lock().is_some()
    }

    /// Whether both handles refer to the same router
    #[inline]
    #[must_use]
    pub fn same_as(&self, other: &Router) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether `other` is mounted somewhere below this router
    #[must_use]
    pub fn contains(&self, other: &Router) -> bool {
        self.inner.stack.load().contains_router(other)
    }

    /// Snapshot of the current stack
    #[must_use]
    pub fn stack(&self) -> Arc<HandlerStack> {
        self.inner.stack.load_full()
    }

    /// Printable view of the stack, records in priority order
    #[must_use]
    pub fn dump_stack(&self) -> Vec<LayerInfo> {
        self.inner.stack.load().describe()
    }

    /// Low-level registration: one record per (path × callback).
    ///
    /// `paths = None` registers for every path under this router's root. The
    /// whole batch is compiled and validated before anything is appended, so a
    /// failing batch leaves the stack untouched.
    ///
    /// # Errors
    ///
    /// - [`RouterError::InvalidPattern`] for a malformed path
    /// - [`RouterError::MountConflict`] when a [`Callback::Mount`] cannot be
    ///   mounted: the child is already mounted, the target is not a single
    ///   string path, or the mount would form a cycle
    pub fn register(
        &self,
        paths: Option<Vec<PathSpec>>,
        method: Option<Method>,
        callbacks: Vec<Callback>,
    ) -> Result<&Self, RouterError> {
        let _registration = self.inner.registration.lock();

        let all_paths = paths.is_none();
        let specs = paths.unwrap_or_else(|| vec![PathSpec::from("/")]);
        if specs.is_empty() || callbacks.is_empty() {
            return Ok(self);
        }

        let mounts: Vec<&Router> = callbacks
            .iter()
            .filter_map(|c| match c {
                Callback::Mount(r) => Some(r),
                _ => None,
            })
            .collect();

        let case_sensitive = self.inner.config.case_sensitive;
        let mut compiled = Vec::with_capacity(specs.len());
        for spec in &specs {
            let pattern = PathPattern::compile(
                spec,
                CompileOptions {
                    prefix_only: all_paths,
                    case_sensitive,
                },
            )?;
            let mount_pattern = if mounts.is_empty() || all_paths {
                None
            } else {
                Some(Arc::new(PathPattern::compile(
                    spec,
                    CompileOptions {
                        prefix_only: true,
                        case_sensitive,
                    },
                )?))
            };
            compiled.push((Arc::new(pattern), mount_pattern));
        }

        let _mount_guard = if mounts.is_empty() {
            None
        } else {
            let guard = MOUNT_LOCK.lock();
            self.claim_mounts(&specs, &mounts)?;
            Some(guard)
        };

        let mut stack = HandlerStack::clone(&self.inner.stack.load());
        let start = stack.len();
        for (pattern, mount_pattern) in &compiled {
            for callback in &callbacks {
                let pattern = match (callback, mount_pattern) {
                    (Callback::Mount(_), Some(mp)) => Arc::clone(mp),
                    _ => Arc::clone(pattern),
                };
                let record_id = stack.push(pattern, method.clone(), callback.clone());
                debug!(
                    record_id = record_id,
                    kind = %callback.kind(),
                    method = ?method,
                    "Record appended"
                );
            }
        }
        let collapsed = if self.inner.config.optimize {
            stack.optimize(start)
        } else {
            0
        };
        let total = stack.len();
        self.inner.stack.store(Arc::new(stack));

        // R1: Registration batch applied
        info!(
            paths = ?specs.iter().map(ToString::to_string).collect::<Vec<_>>(),
            method = ?method,
            records_added = total - start,
            pointers = collapsed,
            total_records = total,
            "Handlers registered"
        );

        Ok(self)
    }

    /// Validate every mount in the batch and stamp the mount path on each
    /// child. Either all children are claimed or none is.
    fn claim_mounts(&self, specs: &[PathSpec], mounts: &[&Router]) -> Result<(), RouterError> {
        let conflict =
            |path: String, reason: MountConflictReason| RouterError::MountConflict { path, reason };
        let path = match specs {
            [PathSpec::Path(p)] => normalize_mount_path(p),
            [regex @ PathSpec::Regex(_)] => {
                return Err(conflict(
                    regex.to_string(),
                    MountConflictReason::NotPathQualified,
                ));
            }
            [_, second, ..] => {
                let reason = if specs.iter().any(|s| matches!(s, PathSpec::Regex(_))) {
                    MountConflictReason::NotPathQualified
                } else {
                    MountConflictReason::MultiplePaths
                };
                return Err(conflict(second.to_string(), reason));
            }
            [] => return Ok(()),
        };

        for (i, child) in mounts.iter().enumerate() {
            if child.same_as(self) || child.contains(self) {
                return Err(conflict(path, MountConflictReason::Cycle));
            }
            if mounts[..i].iter().any(|earlier| earlier.same_as(child)) {
                return Err(conflict(path, MountConflictReason::DuplicateInBatch));
            }
        }

        let mut claimed: Vec<&Router> = Vec::with_capacity(mounts.len());
        for child in mounts {
            let mut slot = child.inner.mount_path.lock();
            if let Some(existing) = slot.as_ref() {
                warn!(
                    path = %path,
                    mounted_at = %existing,
                    "Router already mounted"
                );
                drop(slot);
                for c in claimed {
                    *c.inner.mount_path.lock() = None;
                }
                return Err(conflict(path, MountConflictReason::AlreadyMounted));
            }
            *slot = Some(path.clone());
            claimed.push(child);
        }
        Ok(())
    }

    /// Middleware for every path
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn use_handler<F>(&self, handler: F) -> Result<&Self, RouterError>
    where
        F: Fn(&Request, &Response, Next) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(None, None, vec![Callback::handler(handler)])
    }

    /// Handler for the given path(s), any method
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn use_at<P, F>(&self, paths: P, handler: F) -> Result<&Self, RouterError>
    where
        P: IntoPathSpecs,
        F: Fn(&Request, &Response, Next) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(
            Some(paths.into_path_specs()),
            None,
            vec![Callback::handler(handler)],
        )
    }

    /// Same as [`use_at`](Self::use_at)
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn all<P, F>(&self, paths: P, handler: F) -> Result<&Self, RouterError>
    where
        P: IntoPathSpecs,
        F: Fn(&Request, &Response, Next) -> HandlerResult + Send + Sync + 'static,
    {
        self.use_at(paths, handler)
    }

    /// Error handler for every path
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn use_error<F>(&self, handler: F) -> Result<&Self, RouterError>
    where
        F: Fn(HttpError, &Request, &Response, Next) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(None, None, vec![Callback::error_handler(handler)])
    }

    /// Error handler for the given path(s)
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn use_error_at<P, F>(&self, paths: P, handler: F) -> Result<&Self, RouterError>
    where
        P: IntoPathSpecs,
        F: Fn(HttpError, &Request, &Response, Next) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(
            Some(paths.into_path_specs()),
            None,
            vec![Callback::error_handler(handler)],
        )
    }

    /// Handler restricted to one HTTP method
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn method<P, F>(&self, method: Method, paths: P, handler: F) -> Result<&Self, RouterError>
    where
        P: IntoPathSpecs,
        F: Fn(&Request, &Response, Next) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(
            Some(paths.into_path_specs()),
            Some(method),
            vec![Callback::handler(handler)],
        )
    }

    /// Mount `child` at `path`; its registrations become relative to `path`.
    ///
    /// # Errors
    ///
    /// [`RouterError::MountConflict`] if `child` is already mounted, or is
    /// this router or contains it
    pub fn mount(&self, path: &str, child: &Router) -> Result<&Self, RouterError> {
        self.register(
            Some(vec![PathSpec::from(path)]),
            None,
            vec![Callback::Mount(child.clone())],
        )
    }

    /// Create a child router with this router's configuration, mount it at
    /// `path` and return it.
    ///
    /// # Errors
    ///
    /// See [`mount`](Self::mount).
    pub fn route(&self, path: &str) -> Result<Router, RouterError> {
        let child = Router::with_config(self.inner.config.clone());
        self.mount(path, &child)?;
        Ok(child)
    }

    /// Register a hook for the path parameter `name`.
    ///
    /// # Errors
    ///
    /// - [`RouterError::InvalidParamName`] for an empty or non-word name
    /// - [`RouterError::RegistryFrozen`] once this router has served a request
    pub fn param<F>(&self, name: &str, hook: F) -> Result<&Self, RouterError>
    where
        F: Fn(&Request, &Response, Next, &ParamValue) -> HandlerResult + Send + Sync + 'static,
    {
        let _registration = self.inner.registration.lock();
        let mut registry = ParamHookRegistry::clone(&self.inner.hooks.load());
        registry.register(name, Arc::new(hook))?;
        self.inner.hooks.store(Arc::new(registry));
        info!(param = %name, "Param hook registered");
        Ok(self)
    }

    /// Dispatch a request through the stack.
    ///
    /// With a `terminal` callback, reaching the end of the stack invokes it with
    /// the pending error; without one the default policy responds 404, or with
    /// the pending error's status and message.
    ///
    /// Returns once the stack has been walked as far as the synchronous part
    /// of the handlers goes; a handler that keeps its continuation resumes the
    /// walk later on whichever thread invokes it.
    pub fn handle(&self, req: &Request, res: &Response, terminal: Option<Terminal>) {
        let path = req.path().to_string();
        self.dispatch(req, res, path, String::new(), terminal);
    }

    /// Dispatch on behalf of a parent router, matching `path` (the part left
    /// after the mount prefix).
    pub(crate) fn dispatch_nested(
        &self,
        req: &Request,
        res: &Response,
        path: String,
        base_path: String,
        terminal: Terminal,
    ) {
        self.dispatch(req, res, path, base_path, Some(terminal));
    }

    fn dispatch(
        &self,
        req: &Request,
        res: &Response,
        path: String,
        base_path: String,
        terminal: Option<Terminal>,
    ) {
        self.freeze_hooks();
        Dispatch::start(
            self.inner.stack.load_full(),
            self.inner.hooks.load_full(),
            req.clone(),
            res.clone(),
            path,
            base_path,
            terminal,
        );
    }

    fn freeze_hooks(&self) {
        if self.inner.serving.load(Ordering::Acquire) {
            return;
        }
        let _registration = self.inner.registration.lock();
        if self.inner.serving.load(Ordering::Acquire) {
            return;
        }
        let mut registry = ParamHookRegistry::clone(&self.inner.hooks.load());
        registry.freeze();
        debug!(hooks = registry.len(), "Param hook registry frozen");
        self.inner.hooks.store(Arc::new(registry));
        self.inner.serving.store(true, Ordering::Release);
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("mount_path", &self.mount_path())
            .field("stack", &self.inner.stack.load())
            .field("hooks", &self.inner.hooks.load())
            .finish()
    }
}

/// `/api/` and `api` both mount at `/api`
fn normalize_mount_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

macro_rules! method_shortcuts {
    ($($name:ident => $method:ident),* $(,)?) => {
        impl Router {
            $(
                #[doc = concat!("Handler for `", stringify!($method), "` requests on the given path(s)")]
                ///
                /// # Errors
                ///
                /// See [`register`](Self::register).
                pub fn $name<P, F>(&self, paths: P, handler: F) -> Result<&Self, RouterError>
                where
                    P: IntoPathSpecs,
                    F: Fn(&Request, &Response, Next) -> HandlerResult + Send + Sync + 'static,
                {
                    self.method(Method::$method, paths, handler)
                }
            )*
        }
    };
}

method_shortcuts! {
    get => GET,
    post => POST,
    put => PUT,
    delete => DELETE,
    patch => PATCH,
    head => HEAD,
    options => OPTIONS,
    trace => TRACE,
}
