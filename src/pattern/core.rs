use crate::error::RouterError;
use crate::params::{decode_param, Params};
use regex::{Regex, RegexBuilder};
use std::fmt;
use std::sync::Arc;

/// A registration path: either a string pattern or a raw regex.
#[derive(Debug, Clone)]
pub enum PathSpec {
    /// `/`-separated pattern with optional `:name` segments
    Path(String),
    /// Regex used verbatim, without parameter descriptors
    Regex(Regex),
}

impl PathSpec {
    /// The string pattern, if this is not a raw regex
    #[must_use]
    pub fn as_path(&self) -> Option<&str> {
        match self {
            PathSpec::Path(p) => Some(p),
            PathSpec::Regex(_) => None,
        }
    }
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSpec::Path(p) => f.write_str(p),
            PathSpec::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl From<&str> for PathSpec {
    fn from(path: &str) -> Self {
        PathSpec::Path(path.to_string())
    }
}

impl From<String> for PathSpec {
    fn from(path: String) -> Self {
        PathSpec::Path(path)
    }
}

impl From<&String> for PathSpec {
    fn from(path: &String) -> Self {
        PathSpec::Path(path.clone())
    }
}

impl From<Regex> for PathSpec {
    fn from(re: Regex) -> Self {
        PathSpec::Regex(re)
    }
}

/// Flags that take part in structural equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompileOptions {
    /// Anchor at the start only (mount points, "all paths" registrations)
    pub prefix_only: bool,
    /// Match literal segments case-sensitively
    pub case_sensitive: bool,
}

/// A named capture of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamKey {
    /// Parameter name, without the leading `:`
    pub name: Arc<str>,
    /// Zero-based position among the pattern's captures
    pub position: usize,
}

/// Result of matching a path against a [`PathPattern`].
#[derive(Debug, Clone, PartialEq)]
pub struct PathMatch {
    /// Number of bytes of the path covered by the match. For prefix patterns
    /// this excludes the boundary `/`, so `path[consumed..]` is the remainder
    /// a mounted router sees.
    pub consumed: usize,
    /// Decoded parameters in pattern order
    pub params: Params,
}

/// A compiled matcher plus its ordered parameter descriptors.
#[derive(Debug, Clone)]
pub struct PathPattern {
    regex: Regex,
    keys: Vec<ParamKey>,
    options: CompileOptions,
    raw: bool,
}

impl PathPattern {
    /// Compile a path spec.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] when a `:` segment has no valid
    /// name or the generated regex fails to build.
    pub fn compile(spec: &PathSpec, options: CompileOptions) -> Result<Self, RouterError> {
        match spec {
            PathSpec::Regex(re) => Ok(Self {
                regex: re.clone(),
                keys: Vec::new(),
                options: CompileOptions {
                    prefix_only: false,
                    case_sensitive: true,
                },
                raw: true,
            }),
            PathSpec::Path(path) => {
                let (source, keys) = Self::path_to_source(path, options)?;
                let regex = RegexBuilder::new(&source)
                    .case_insensitive(!options.case_sensitive)
                    .build()
                    .map_err(|e| RouterError::InvalidPattern {
                        pattern: path.clone(),
                        reason: e.to_string(),
                    })?;
                Ok(Self {
                    regex,
                    keys,
                    options,
                    raw: false,
                })
            }
        }
    }

    /// Translate `/users/:id` into `^/users/([^/]+?)/?$` (or the prefix form
    /// `^/users/([^/]+?)(?:/|$)`) and collect the parameter names.
    fn path_to_source(
        path: &str,
        options: CompileOptions,
    ) -> Result<(String, Vec<ParamKey>), RouterError> {
        let trimmed = path.trim_matches('/');

        if trimmed.is_empty() {
            let source = if options.prefix_only { "^" } else { "^/?$" };
            return Ok((source.to_string(), Vec::new()));
        }

        let mut source = String::with_capacity(path.len() + 16);
        source.push('^');
        let mut keys = Vec::with_capacity(path.matches(':').count());

        for segment in trimmed.split('/') {
            source.push('/');
            if let Some(name) = segment.strip_prefix(':') {
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    return Err(RouterError::InvalidPattern {
                        pattern: path.to_string(),
                        reason: format!("segment '{segment}' is not a valid parameter"),
                    });
                }
                source.push_str("([^/]+?)");
                keys.push(ParamKey {
                    name: Arc::from(name),
                    position: keys.len(),
                });
            } else {
                source.push_str(&regex::escape(segment));
            }
        }

        if options.prefix_only {
            source.push_str("(?:/|$)");
        } else {
            source.push_str("/?$");
        }

        Ok((source, keys))
    }

    /// Compiled regex source (flags excluded)
    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        self.regex.as_str()
    }

    /// Parameter descriptors in left-to-right order
    #[inline]
    #[must_use]
    pub fn keys(&self) -> &[ParamKey] {
        &self.keys
    }

    /// Flags this pattern was compiled with
    #[inline]
    #[must_use]
    pub fn options(&self) -> CompileOptions {
        self.options
    }

    /// Whether this pattern came from a raw regex
    #[inline]
    #[must_use]
    pub fn is_raw(&self) -> bool {
        self.raw
    }

    /// Same compiled source, same flags and same parameter names.
    ///
    /// Names are compared because a pointer record reads its parameters from
    /// the canonical record's match.
    #[must_use]
    pub fn structurally_eq(&self, other: &PathPattern) -> bool {
        self.raw == other.raw
            && self.options == other.options
            && self.source() == other.source()
            && self.keys == other.keys
    }

    /// Match a request path.
    ///
    /// Parameters are percent-decoded; a value that fails to decode is kept
    /// as [`ParamValue::Undecodable`](crate::params::ParamValue::Undecodable).
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<PathMatch> {
        let caps = self.regex.captures(path)?;
        let whole = caps.get(0)?;

        let mut consumed = whole.end();
        if self.options.prefix_only
            && !self.raw
            && consumed > 0
            && path.as_bytes().get(consumed - 1) == Some(&b'/')
        {
            consumed -= 1;
        }

        let mut params = Params::new();
        for key in &self.keys {
            if let Some(m) = caps.get(key.position + 1) {
                params.push(Arc::clone(&key.name), decode_param(m.as_str()));
            }
        }

        Some(PathMatch { consumed, params })
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source())?;
        if !self.raw && !self.options.case_sensitive {
            f.write_str(" (i)")?;
        }
        Ok(())
    }
}
