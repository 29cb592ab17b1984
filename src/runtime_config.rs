//! # Runtime Configuration Module
//!
//! Router behaviour that is fixed at startup: matching flags, whether the stack
//! optimizer runs, and the coroutine stack size used by the HTTP adapter.
//!
//! Configuration comes from defaults, optionally a YAML file, then environment
//! variables (highest precedence).
//!
//! ## Environment Variables
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `BRRTS_ENV` | Deployment environment label | `development` |
//! | `BRRTS_CASE_SENSITIVE` | Literal segments match case-sensitively | `false` |
//! | `BRRTS_OPTIMIZE` | Collapse duplicate patterns into pointer records | `true` |
//! | `BRRTS_STACK_SIZE` | Coroutine stack size, decimal or `0x` hex | `0x4000` |
//!
//! ## Example
//!
//! ```yaml
//! env: production
//! case_sensitive: true
//! stack_size: 0x8000
//! ```
//!
//! ```rust,no_run
//! use brrtstack::runtime_config::RouterConfig;
//!
//! let config = RouterConfig::load(Some("config.yaml".as_ref())).unwrap();
//! println!("Stack size: {} bytes", config.stack_size);
//! ```

use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize};
use std::env;
use std::path::Path;
use tracing::warn;

const DEFAULT_STACK_SIZE: usize = 0x4000;

/// Router configuration.
///
/// Child routers created with [`Router::route`](crate::router::Router::route)
/// inherit their parent's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Deployment environment label (`development`, `production`, ...)
    pub env: String,
    /// Match literal path segments case-sensitively
    pub case_sensitive: bool,
    /// Rewrite duplicate patterns into pointer records after each registration
    pub optimize: bool,
    /// Stack size for coroutines in bytes (default: 16 KB / 0x4000)
    #[serde(deserialize_with = "deserialize_stack_size")]
    pub stack_size: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            env: "development".to_string(),
            case_sensitive: false,
            optimize: true,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl RouterConfig {
    /// Defaults overlaid with environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Read a YAML file; missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not valid YAML for this struct.
    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Optional YAML file, then the environment.
    ///
    /// # Errors
    ///
    /// Propagates [`from_yaml_file`](Self::from_yaml_file) failures.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_yaml_file(p)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Overlay `BRRTS_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| env::var(key).ok());
    }

    /// Overlay variables from an arbitrary lookup. Invalid values are logged
    /// and ignored.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("BRRTS_ENV") {
            if !v.trim().is_empty() {
                self.env = v.trim().to_string();
            }
        }
        if let Some(v) = lookup("BRRTS_CASE_SENSITIVE") {
            match parse_bool(&v) {
                Some(b) => self.case_sensitive = b,
                None => warn!(value = %v, "Ignoring invalid BRRTS_CASE_SENSITIVE"),
            }
        }
        if let Some(v) = lookup("BRRTS_OPTIMIZE") {
            match parse_bool(&v) {
                Some(b) => self.optimize = b,
                None => warn!(value = %v, "Ignoring invalid BRRTS_OPTIMIZE"),
            }
        }
        if let Some(v) = lookup("BRRTS_STACK_SIZE") {
            match parse_stack_size(&v) {
                Some(size) => self.stack_size = size,
                None => warn!(value = %v, "Ignoring invalid BRRTS_STACK_SIZE"),
            }
        }
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        self.env.eq_ignore_ascii_case("production")
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Decimal (`16384`) or hexadecimal (`0x4000`)
fn parse_stack_size(s: &str) -> Option<usize> {
    let s = s.trim();
    let size = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok()?,
        None => s.parse().ok()?,
    };
    (size > 0).then_some(size)
}

fn deserialize_stack_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(usize),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) if n > 0 => Ok(n),
        Raw::Number(_) => Err(serde::de::Error::custom("stack_size must be positive")),
        Raw::Text(s) => parse_stack_size(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid stack_size '{s}'"))),
    }
}
