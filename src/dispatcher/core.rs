use crate::error::HttpError;
use crate::handler::{Callback, HandlerKind, HandlerResult, ParamHook, Terminal};
use crate::params::{ParamHookRegistry, ParamValue, Params};
use crate::pattern::PathMatch;
use crate::server::{Request, Response};
use crate::stack::{HandlerStack, Layer, RecordId};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Span};

/// Dispatch state machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scanning,
    ParamPending,
    HandlerRunning,
    Done,
}

struct DispatchContext {
    phase: Phase,
    cursor: usize,
    /// Id of the step whose continuation is outstanding
    step: u64,
    pending_error: Option<HttpError>,
    /// Match results indexed by matcher id
    matches: Vec<Option<PathMatch>>,
    fired: HashSet<(Arc<str>, ParamValue)>,
    /// A thread is inside `drive`
    driving: bool,
    /// A continuation arrived while a callback was still running
    resumed: bool,
}

enum Action {
    Hook {
        hook: Arc<dyn ParamHook>,
        name: Arc<str>,
        value: ParamValue,
        params: Params,
        record_id: RecordId,
        next: Next,
    },
    Invoke {
        callback: Callback,
        error: Option<HttpError>,
        params: Params,
        consumed: usize,
        record_id: RecordId,
        next: Next,
    },
    Finish(Option<HttpError>),
}

/// One request travelling through one router.
pub(crate) struct Dispatch {
    stack: Arc<HandlerStack>,
    hooks: Arc<ParamHookRegistry>,
    req: Request,
    res: Response,
    /// Path relative to this router
    path: String,
    /// Prefix consumed by enclosing mounts
    base_path: String,
    terminal: Mutex<Option<Terminal>>,
    ctx: Mutex<DispatchContext>,
    span: Span,
    started: Instant,
}

impl Dispatch {
    pub(crate) fn start(
        stack: Arc<HandlerStack>,
        hooks: Arc<ParamHookRegistry>,
        req: Request,
        res: Response,
        path: String,
        base_path: String,
        terminal: Option<Terminal>,
    ) {
        let span = info_span!(
            "dispatch",
            request_id = %req.id(),
            method = %req.method(),
            path = %path,
            base_path = %base_path,
        );

        let ctx = DispatchContext {
            phase: Phase::Scanning,
            cursor: 0,
            step: 0,
            pending_error: None,
            matches: vec![None; stack.matcher_slots()],
            fired: HashSet::new(),
            driving: true,
            resumed: false,
        };

        let dispatch = Arc::new(Dispatch {
            stack,
            hooks,
            req,
            res,
            path,
            base_path,
            terminal: Mutex::new(terminal),
            ctx: Mutex::new(ctx),
            span,
            started: Instant::now(),
        });

        {
            let _enter = dispatch.span.enter();
            // D1: Dispatch start
            debug!(
                records = dispatch.stack.len(),
                hooks = dispatch.hooks.len(),
                "Dispatch start"
            );
        }

        dispatch.drive();
    }

    /// Run the scan loop until a callback keeps its continuation or the
    /// stack is exhausted. Only one thread drives at a time.
    fn drive(self: &Arc<Self>) {
        let _enter = self.span.enter();
        loop {
            let action = {
                let mut ctx = self.ctx.lock();
                self.scan(&mut ctx)
            };

            match action {
                Action::Finish(error) => {
                    self.finish(error);
                    return;
                }
                Action::Hook {
                    hook,
                    name,
                    value,
                    params,
                    record_id,
                    next,
                } => {
                    self.req.set_scope(params, &self.path, &self.base_path);
                    // D3: Param hook invoked
                    debug!(record_id = record_id, param = %name, value = %value, "Param hook invoked");
                    self.invoke(&next, record_id, || {
                        hook.call(&self.req, &self.res, next.clone(), &value)
                    });
                }
                Action::Invoke {
                    callback,
                    error,
                    params,
                    consumed,
                    record_id,
                    next,
                } => {
                    self.req.set_scope(params, &self.path, &self.base_path);
                    self.run_callback(callback, error, consumed, record_id, next);
                }
            }

            let mut ctx = self.ctx.lock();
            if ctx.resumed {
                ctx.resumed = false;
                continue;
            }
            ctx.driving = false;
            return;
        }
    }

    fn scan(self: &Arc<Self>, ctx: &mut DispatchContext) -> Action {
        let method = self.req.method();

        while let Some(layer) = self.stack.get(ctx.cursor) {
            let matcher = layer.matcher();

            let matched = match layer {
                // Pointers reuse the canonical record's result, never run a regex.
                Layer::Pointer(_) => ctx.matches[matcher].is_some(),
                Layer::Record(_) => {
                    if ctx.matches[matcher].is_none() {
                        ctx.matches[matcher] = self
                            .stack
                            .pattern(matcher)
                            .and_then(|p| p.matches(&self.path));
                    }
                    ctx.matches[matcher].is_some()
                }
            };
            if !matched {
                ctx.cursor += 1;
                continue;
            }

            if layer.method().is_some_and(|m| m != method) {
                ctx.cursor += 1;
                continue;
            }

            let wants_error = layer.kind() == HandlerKind::ErrorHandler;
            if wants_error != ctx.pending_error.is_some() {
                ctx.cursor += 1;
                continue;
            }

            let Some(found) = ctx.matches[matcher].clone() else {
                ctx.cursor += 1;
                continue;
            };

            // D2: Record matched
            debug!(
                record_id = layer.id(),
                cursor = ctx.cursor,
                pointer = layer.is_pointer(),
                kind = %layer.kind(),
                "Record matched"
            );

            if !self.hooks.is_empty() {
                for (name, value) in found.params.iter() {
                    let Some(hook) = self.hooks.get(name) else {
                        continue;
                    };
                    if !ctx.fired.insert((Arc::clone(name), value.clone())) {
                        continue;
                    }
                    ctx.phase = Phase::ParamPending;
                    return Action::Hook {
                        hook: Arc::clone(hook),
                        name: Arc::clone(name),
                        value: value.clone(),
                        params: found.params.clone(),
                        record_id: layer.id(),
                        next: self.issue(ctx),
                    };
                }
            }

            ctx.cursor += 1;
            ctx.phase = Phase::HandlerRunning;
            let error = if wants_error {
                ctx.pending_error.take()
            } else {
                None
            };
            return Action::Invoke {
                callback: layer.callback().clone(),
                error,
                params: found.params,
                consumed: found.consumed,
                record_id: layer.id(),
                next: self.issue(ctx),
            };
        }

        ctx.phase = Phase::Done;
        Action::Finish(ctx.pending_error.take())
    }

    fn issue(self: &Arc<Self>, ctx: &DispatchContext) -> Next {
        Next {
            dispatch: Arc::clone(self),
            step: ctx.step,
            spent: Arc::new(AtomicBool::new(false)),
        }
    }

    fn run_callback(
        self: &Arc<Self>,
        callback: Callback,
        error: Option<HttpError>,
        consumed: usize,
        record_id: RecordId,
        next: Next,
    ) {
        match callback {
            Callback::Handler(handler) => {
                // D4: Handler invoked
                debug!(record_id = record_id, kind = "handler", "Handler invoked");
                self.invoke(&next, record_id, || {
                    handler.call(&self.req, &self.res, next.clone())
                });
            }
            Callback::ErrorHandler(handler) => {
                let error = error.unwrap_or_else(|| HttpError::internal("Unknown Error"));
                debug!(
                    record_id = record_id,
                    kind = "error",
                    status = error.status(),
                    "Handler invoked"
                );
                self.invoke(&next, record_id, || {
                    handler.call(error, &self.req, &self.res, next.clone())
                });
            }
            Callback::Mount(child) => {
                let consumed = consumed.min(self.path.len());
                let (prefix, rest) = self.path.split_at(consumed);
                let remaining = if rest.is_empty() { "/" } else { rest };
                let base_path = format!("{}{}", self.base_path, prefix);
                debug!(
                    record_id = record_id,
                    kind = "router",
                    remaining = %remaining,
                    base_path = %base_path,
                    "Handler invoked"
                );
                let parent = next.clone();
                let terminal: Terminal = Box::new(move |error| {
                    parent.resume(error);
                });
                let remaining = remaining.to_string();
                self.invoke(&next, record_id, || {
                    child.dispatch_nested(&self.req, &self.res, remaining, base_path, terminal);
                    Ok(())
                });
            }
        }
    }

    /// Run a callback, turning a returned error or a panic into a
    /// continuation call.
    fn invoke(&self, next: &Next, record_id: RecordId, f: impl FnOnce() -> HandlerResult) {
        let outcome = catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|panic| {
            let error = HttpError::from_panic(panic.as_ref());
            // D5: Callback panicked
            error!(
                record_id = record_id,
                panic_message = %error.message(),
                "Handler panicked - CRITICAL"
            );
            Err(error)
        });

        if let Err(error) = outcome {
            if !next.deliver(Some(error.clone())) {
                // D6: Continuation ignored
                warn!(
                    record_id = record_id,
                    status = error.status(),
                    error = %error.message(),
                    "Handler returned an error after using its continuation - ignored"
                );
            }
        }
    }

    /// Accept the continuation for `step`. Returns `false` for a stale step.
    fn accept(self: &Arc<Self>, step: u64, input: Option<HttpError>) -> bool {
        let mut ctx = self.ctx.lock();
        if ctx.step != step
            || !matches!(ctx.phase, Phase::ParamPending | Phase::HandlerRunning)
        {
            return false;
        }
        ctx.step += 1;

        match ctx.phase {
            Phase::ParamPending => {
                // A failing hook rescans its record in error mode: a normal
                // record is skipped, an error handler receives the error.
                if let Some(error) = input {
                    ctx.pending_error = Some(error);
                }
            }
            _ => ctx.pending_error = input,
        }
        ctx.phase = Phase::Scanning;

        if ctx.driving {
            ctx.resumed = true;
            return true;
        }
        ctx.driving = true;
        drop(ctx);

        self.drive();
        true
    }

    fn finish(&self, error: Option<HttpError>) {
        let elapsed_us = self.started.elapsed().as_micros() as u64;
        let terminal = self.terminal.lock().take();

        if let Some(terminal) = terminal {
            debug!(
                has_error = error.is_some(),
                elapsed_us = elapsed_us,
                "Dispatch handing back to parent"
            );
            terminal(error);
            return;
        }

        if self.res.is_ended() {
            if let Some(error) = &error {
                warn!(
                    status = error.status(),
                    error = %error.message(),
                    "Unhandled error after response ended"
                );
            }
        } else {
            match &error {
                None => {
                    let body = format!("{} {} Not Found", self.req.method(), self.req.path());
                    self.res.plain(404, &body);
                }
                Some(error) => {
                    self.res.plain(error.status(), error.message());
                }
            }
        }

        // D7: Dispatch complete
        info!(
            request_id = %self.req.id(),
            method = %self.req.method(),
            path = %self.req.path(),
            status = self.res.status(),
            elapsed_us = elapsed_us,
            "Dispatch complete"
        );
    }
}

/// Single-use continuation handed to hooks and handlers.
///
/// Clones share one use: whichever clone is invoked first resumes the
/// dispatch, every later invocation returns `false`.
#[derive(Clone)]
pub struct Next {
    dispatch: Arc<Dispatch>,
    step: u64,
    spent: Arc<AtomicBool>,
}

impl Next {
    /// Continue with no error
    pub fn call(&self) -> bool {
        self.resume(None)
    }

    /// Continue with `error` pending. Strings become 500 errors.
    pub fn fail(&self, error: impl Into<HttpError>) -> bool {
        self.resume(Some(error.into()))
    }

    /// Continue with an error synthesized from a status code; see
    /// [`HttpError::from_status`].
    pub fn fail_status(&self, status: u16) -> bool {
        let error = HttpError::from_status(
            status,
            self.dispatch.req.method(),
            self.dispatch.req.path(),
        );
        self.resume(Some(error))
    }

    /// Continue with an optional error.
    ///
    /// Returns `false` (and does nothing) if this continuation was already
    /// used or belongs to a step the dispatch has moved past.
    pub fn resume(&self, error: Option<HttpError>) -> bool {
        let accepted = self.deliver(error);
        if !accepted {
            warn!(
                request_id = %self.dispatch.req.id(),
                step = self.step,
                "Continuation invoked more than once - ignored"
            );
        }
        accepted
    }

    #[must_use]
    pub fn is_spent(&self) -> bool {
        self.spent.load(Ordering::Acquire)
    }

    /// Current phase of the dispatch this continuation belongs to
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.dispatch.ctx.lock().phase
    }

    fn deliver(&self, error: Option<HttpError>) -> bool {
        if self.spent.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.dispatch.accept(self.step, error)
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("request_id", &self.dispatch.req.id())
            .field("step", &self.step)
            .field("spent", &self.is_spent())
            .finish()
    }
}
