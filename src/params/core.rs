use crate::error::RouterError;
use crate::handler::ParamHook;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Maximum number of path parameters before heap allocation.
/// Most REST APIs have ≤4 path params (e.g., /users/:id/posts/:post_id).
pub const MAX_INLINE_PARAMS: usize = 8;

/// A resolved path parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamValue {
    /// Percent-decoded value
    Decoded(String),
    /// The raw capture was not valid percent-encoded UTF-8
    Undecodable,
}

impl ParamValue {
    /// Decoded value, `None` for the undecodable sentinel
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Decoded(s) => Some(s),
            ParamValue::Undecodable => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_undecodable(&self) -> bool {
        matches!(self, ParamValue::Undecodable)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Decoded(s) => f.write_str(s),
            ParamValue::Undecodable => f.write_str("<undecodable>"),
        }
    }
}

/// Percent-decode a captured path segment.
///
/// `+` is left alone (it only means space in form bodies). Truncated or
/// non-hex escapes and escapes that decode to invalid UTF-8 produce
/// [`ParamValue::Undecodable`].
#[must_use]
pub fn decode_param(raw: &str) -> ParamValue {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return ParamValue::Undecodable;
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    match urlencoding::decode(raw) {
        Ok(decoded) => ParamValue::Decoded(decoded.into_owned()),
        Err(_) => ParamValue::Undecodable,
    }
}

/// Stack-allocated parameter storage for the hot path.
///
/// Param names use `Arc<str>` because they come from the compiled patterns
/// (known at startup); values are per-request data.
pub type ParamVec = SmallVec<[(Arc<str>, ParamValue); MAX_INLINE_PARAMS]>;

/// Ordered path parameters of one match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(ParamVec);

impl Params {
    #[must_use]
    pub fn new() -> Self {
        Self(ParamVec::new())
    }

    pub fn push(&mut self, name: Arc<str>, value: ParamValue) {
        self.0.push((name, value));
    }

    /// Get a parameter by name
    ///
    /// Uses "last write wins" semantics: if duplicate parameter names exist
    /// at different path depths (e.g., `/org/:id/user/:id`), returns the last
    /// occurrence.
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v)
    }

    /// Decoded value of a parameter; `None` when absent or undecodable
    #[inline]
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Arc<str>, ParamValue)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert to a HashMap of decoded values
    /// Note: This allocates - use get() in hot paths instead
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, String> {
        self.0
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.to_string(), s.to_string())))
            .collect()
    }
}

/// Engine-owned mapping from parameter name to hook.
///
/// Populated during registration and frozen when the owning router serves its
/// first request; registering afterwards fails with
/// [`RouterError::RegistryFrozen`].
#[derive(Clone, Default)]
pub struct ParamHookRegistry {
    hooks: HashMap<Arc<str>, Arc<dyn ParamHook>>,
    frozen: bool,
}

impl ParamHookRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the hook for `name`.
    ///
    /// # Errors
    ///
    /// - [`RouterError::InvalidParamName`] if `name` is empty or contains
    ///   non-word characters
    /// - [`RouterError::RegistryFrozen`] once the registry is frozen
    pub fn register(&mut self, name: &str, hook: Arc<dyn ParamHook>) -> Result<(), RouterError> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(RouterError::InvalidParamName {
                name: name.to_string(),
            });
        }
        if self.frozen {
            return Err(RouterError::RegistryFrozen {
                name: name.to_string(),
            });
        }
        if self.hooks.insert(Arc::from(name), hook).is_some() {
            debug!(param = %name, "Replaced existing param hook");
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ParamHook>> {
        self.hooks.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.hooks.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.hooks.keys().map(|k| k.to_string()).collect();
        names.sort();
        names
    }
}

impl fmt::Debug for ParamHookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamHookRegistry")
            .field("names", &self.names())
            .field("frozen", &self.frozen)
            .finish()
    }
}
