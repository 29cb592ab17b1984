use crate::dispatcher::Next;
use crate::error::HttpError;
use crate::params::ParamValue;
use crate::router::Router;
use crate::runtime_config::RouterConfig;
use crate::server::{serve, Request, Response};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "brrtstack")]
#[command(about = "brrtstack middleware dispatch engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the demo application until SIGINT/SIGTERM
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080", env = "BRRTS_ADDR")]
        addr: String,

        /// YAML router configuration; `BRRTS_*` variables override it
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the demo application's handler stack
    Routes {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Serialize)]
struct User {
    id: u32,
    name: &'static str,
}

const USERS: [User; 3] = [
    User { id: 1, name: "ada" },
    User { id: 2, name: "grace" },
    User { id: 3, name: "linus" },
];

fn find_user(value: &ParamValue) -> Option<User> {
    let id: u32 = value.as_str()?.parse().ok()?;
    USERS.iter().find(|u| u.id == id).cloned()
}

/// The application served by `brrtstack serve`.
///
/// ```text
/// *            stamp x-request-id
/// GET  /                     index
/// GET  /health, HEAD /health health (HEAD shares the GET matcher)
/// /api         mounted router
///   :user_id   param hook loading the user, 404 if unknown
///   GET  /users              list
///   GET  /users/:user_id     one user
///   GET  /users/:user_id/slow responds from a coroutine
/// *            JSON error handler
/// ```
///
/// # Errors
///
/// Only if a registration is rejected.
pub fn demo_router(config: RouterConfig) -> Result<Router> {
    let app = Router::with_config(config);

    app.use_handler(|req: &Request, res: &Response, next: Next| {
        res.set_header("x-request-id", req.id().to_string());
        next.call();
        Ok(())
    })?;

    app.get("/", |_req: &Request, res: &Response, _next: Next| {
        res.send("<h1>brrtstack</h1>");
        Ok(())
    })?;
    app.get("/health", |_req: &Request, res: &Response, _next: Next| {
        res.json(&serde_json::json!({ "status": "ok" }));
        Ok(())
    })?;
    app.head("/health", |_req: &Request, res: &Response, _next: Next| {
        res.send_status(200);
        Ok(())
    })?;

    let api = app.route("/api")?;
    api.param(
        "user_id",
        |req: &Request, _res: &Response, next: Next, value: &ParamValue| {
            match find_user(value) {
                Some(user) => {
                    req.insert_data(user);
                    next.call();
                }
                None => {
                    next.fail(HttpError::new(404, format!("user {value} not found")));
                }
            }
            Ok(())
        },
    )?;
    api.get("/users", |_req: &Request, res: &Response, _next: Next| {
        res.json(&USERS);
        Ok(())
    })?;
    api.get(
        "/users/:user_id",
        |req: &Request, res: &Response, next: Next| match req.data::<User>() {
            Some(user) => {
                res.json(&user);
                Ok(())
            }
            None => {
                next.fail_status(404);
                Ok(())
            }
        },
    )?;
    api.get(
        "/users/:user_id/slow",
        |req: &Request, res: &Response, next: Next| {
            let req = req.clone();
            let res = res.clone();
            may::go!(move || {
                may::coroutine::sleep(Duration::from_millis(20));
                match req.data::<User>() {
                    Some(user) => {
                        res.json(&user);
                    }
                    None => {
                        next.fail_status(404);
                    }
                }
            });
            Ok(())
        },
    )?;

    app.use_error(
        |err: HttpError, _req: &Request, res: &Response, _next: Next| {
            res.set_status(err.status());
            res.json(&serde_json::json!({
                "status": err.status(),
                "error": err.message(),
            }));
            Ok(())
        },
    )?;

    Ok(app)
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

/// Execute a parsed command line.
///
/// # Errors
///
/// Configuration, registration and bind failures.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve { addr, config } => {
            let config = RouterConfig::load(config.as_deref())?;
            may::config().set_stack_size(config.stack_size);
            info!(
                env = %config.env,
                stack_size = config.stack_size,
                optimize = config.optimize,
                "Router configuration loaded"
            );

            let router = demo_router(config)?;
            let handle = serve(router, addr.as_str())
                .with_context(|| format!("failed to bind {addr}"))?;
            handle.wait_ready().context("server did not become ready")?;
            println!("brrtstack listening on http://{}", handle.addr());

            wait_for_shutdown()?;
            handle.stop();
            Ok(())
        }
        Commands::Routes { config } => {
            let config = RouterConfig::load(config.as_deref())?;
            let router = demo_router(config)?;
            for layer in router.dump_stack() {
                println!("{layer}");
            }
            if let Some(api) = find_mount(&router, "/api") {
                println!("--- /api");
                for layer in api.dump_stack() {
                    println!("{layer}");
                }
            }
            Ok(())
        }
    }
}

fn find_mount(router: &Router, path: &str) -> Option<Router> {
    router.stack().layers().iter().find_map(|layer| match layer.callback() {
        crate::handler::Callback::Mount(child)
            if child.mount_path().as_deref() == Some(path) =>
        {
            Some(child.clone())
        }
        _ => None,
    })
}

#[cfg(unix)]
fn wait_for_shutdown() -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("installing signal handlers")?;
    if let Some(signal) = signals.forever().next() {
        info!(signal = signal, "Shutdown signal received");
    }
    Ok(())
}

#[cfg(not(unix))]
fn wait_for_shutdown() -> Result<()> {
    loop {
        std::thread::park();
    }
}
