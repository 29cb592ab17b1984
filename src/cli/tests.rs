//! Unit tests for CLI commands

use crate::cli::{demo_router, Cli, Commands};
use crate::runtime_config::RouterConfig;
use crate::server::{Request, RouterService};
use clap::Parser;
use http::Method;

#[test]
fn test_serve_command_defaults() {
    let cli = Cli::try_parse_from(["brrtstack", "serve"]).unwrap();

    match cli.command {
        Commands::Serve { addr, config } => {
            assert_eq!(addr, "0.0.0.0:8080");
            assert!(config.is_none());
        }
        _ => panic!("Expected Serve command"),
    }
}

#[test]
fn test_serve_command_with_flags() {
    let cli = Cli::try_parse_from([
        "brrtstack",
        "serve",
        "--addr",
        "127.0.0.1:9000",
        "--config",
        "router.yaml",
    ])
    .unwrap();

    match cli.command {
        Commands::Serve { addr, config } => {
            assert_eq!(addr, "127.0.0.1:9000");
            assert_eq!(config.unwrap().to_string_lossy(), "router.yaml");
        }
        _ => panic!("Expected Serve command"),
    }
}

#[test]
fn test_routes_command() {
    let cli = Cli::try_parse_from(["brrtstack", "routes", "-c", "r.yaml"]).unwrap();
    assert!(matches!(cli.command, Commands::Routes { config: Some(_) }));
}

#[test]
fn test_unknown_command_rejected() {
    assert!(Cli::try_parse_from(["brrtstack", "generate"]).is_err());
}

#[test]
fn test_demo_health_head_is_pointer() {
    let router = demo_router(RouterConfig::default()).unwrap();
    let layers = router.dump_stack();
    let health: Vec<_> = layers
        .iter()
        .filter(|l| l.pattern.starts_with("^/health/?$"))
        .collect();
    assert_eq!(health.len(), 2);
    assert!(health[0].pointer_to.is_none());
    assert_eq!(health[1].pointer_to, Some(health[0].id));
}

#[test]
fn test_demo_user_lookup() {
    let service = RouterService::new(demo_router(RouterConfig::default()).unwrap());

    let snap = service.respond(&Request::new(Method::GET, "/api/users/2"));
    assert_eq!(snap.status, 200);
    assert!(snap.body_str().contains("grace"));
    assert!(snap.header("x-request-id").is_some());

    let snap = service.respond(&Request::new(Method::GET, "/api/users/99"));
    assert_eq!(snap.status, 404);
    assert!(snap.body_str().contains("user 99 not found"));
}

#[test]
fn test_demo_slow_handler_completes() {
    let service = RouterService::new(demo_router(RouterConfig::default()).unwrap());
    let snap = service.respond(&Request::new(Method::GET, "/api/users/3/slow"));
    assert_eq!(snap.status, 200);
    assert!(snap.body_str().contains("linus"));
}

#[test]
fn test_demo_unknown_path_is_404() {
    let service = RouterService::new(demo_router(RouterConfig::default()).unwrap());
    let snap = service.respond(&Request::new(Method::GET, "/nowhere"));
    assert_eq!(snap.status, 404);
    assert_eq!(snap.body_str(), "GET /nowhere Not Found");
}
