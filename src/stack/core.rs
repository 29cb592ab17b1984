use crate::handler::{Callback, HandlerKind};
use crate::pattern::PathPattern;
use crate::router::Router;
use http::Method;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Registration-order identifier, unique within one router
pub type RecordId = u64;

/// Index into a stack's matcher arena
pub type MatcherId = usize;

/// A record that owns its matcher.
#[derive(Clone, Debug)]
pub struct HandlerRecord {
    pub id: RecordId,
    pub matcher: MatcherId,
    pub method: Option<Method>,
    pub callback: Callback,
}

/// A record sharing the matcher of an earlier, structurally equal record.
#[derive(Clone, Debug)]
pub struct PointerRecord {
    pub id: RecordId,
    /// Id of the record whose match result is reused
    pub canonical: RecordId,
    /// The canonical record's matcher
    pub matcher: MatcherId,
    pub method: Option<Method>,
    pub callback: Callback,
}

#[derive(Clone, Debug)]
pub enum Layer {
    Record(HandlerRecord),
    Pointer(PointerRecord),
}

impl Layer {
    #[inline]
    #[must_use]
    pub fn id(&self) -> RecordId {
        match self {
            Layer::Record(r) => r.id,
            Layer::Pointer(p) => p.id,
        }
    }

    #[inline]
    #[must_use]
    pub fn matcher(&self) -> MatcherId {
        match self {
            Layer::Record(r) => r.matcher,
            Layer::Pointer(p) => p.matcher,
        }
    }

    #[inline]
    #[must_use]
    pub fn method(&self) -> Option<&Method> {
        match self {
            Layer::Record(r) => r.method.as_ref(),
            Layer::Pointer(p) => p.method.as_ref(),
        }
    }

    #[inline]
    #[must_use]
    pub fn callback(&self) -> &Callback {
        match self {
            Layer::Record(r) => &r.callback,
            Layer::Pointer(p) => &p.callback,
        }
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> HandlerKind {
        self.callback().kind()
    }

    #[inline]
    #[must_use]
    pub fn is_pointer(&self) -> bool {
        matches!(self, Layer::Pointer(_))
    }
}

/// Printable summary of one layer, used by `routes` and debug logging.
#[derive(Debug, Clone, Serialize)]
pub struct LayerInfo {
    pub id: RecordId,
    pub kind: String,
    pub method: Option<String>,
    pub pattern: String,
    pub pointer_to: Option<RecordId>,
    pub mount: Option<String>,
}

impl fmt::Display for LayerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:<4} {:<8} {:<7} {}",
            self.id,
            self.kind,
            self.method.as_deref().unwrap_or("*"),
            self.pattern
        )?;
        if let Some(target) = self.pointer_to {
            write!(f, "  -> #{target}")?;
        }
        if let Some(mount) = &self.mount {
            write!(f, "  [router at {mount}]")?;
        }
        Ok(())
    }
}

/// Ordered, append-only list of layers plus the matcher arena they index.
#[derive(Clone, Default)]
pub struct HandlerStack {
    pub(super) layers: Vec<Layer>,
    pub(super) matchers: Vec<Option<Arc<PathPattern>>>,
    pub(super) next_id: RecordId,
}

impl HandlerStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record with a fresh id and its own arena slot.
    pub fn push(
        &mut self,
        pattern: Arc<PathPattern>,
        method: Option<Method>,
        callback: Callback,
    ) -> RecordId {
        let id = self.next_id;
        self.next_id += 1;
        let matcher = self.matchers.len();
        self.matchers.push(Some(pattern));
        self.layers.push(Layer::Record(HandlerRecord {
            id,
            matcher,
            method,
            callback,
        }));
        id
    }

    #[inline]
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    /// Compiled pattern behind a matcher id; `None` once the slot was
    /// released by the optimizer.
    #[inline]
    #[must_use]
    pub fn pattern(&self, matcher: MatcherId) -> Option<&Arc<PathPattern>> {
        self.matchers.get(matcher).and_then(Option::as_ref)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Size of the matcher arena, including released slots
    #[inline]
    #[must_use]
    pub fn matcher_slots(&self) -> usize {
        self.matchers.len()
    }

    /// Number of matchers still owned by a record
    #[must_use]
    pub fn live_matchers(&self) -> usize {
        self.matchers.iter().filter(|m| m.is_some()).count()
    }

    /// Id the next pushed record will get
    #[must_use]
    pub fn next_id(&self) -> RecordId {
        self.next_id
    }

    /// Whether `router` is mounted anywhere inside this stack, directly or
    /// through nested routers.
    #[must_use]
    pub fn contains_router(&self, router: &Router) -> bool {
        self.layers.iter().any(|layer| match layer.callback() {
            Callback::Mount(child) => child.same_as(router) || child.contains(router),
            _ => false,
        })
    }

    #[must_use]
    pub fn describe(&self) -> Vec<LayerInfo> {
        self.layers
            .iter()
            .map(|layer| LayerInfo {
                id: layer.id(),
                kind: match layer.callback() {
                    Callback::Mount(_) => "router".to_string(),
                    other => other.kind().to_string(),
                },
                method: layer.method().map(ToString::to_string),
                pattern: self
                    .pattern(layer.matcher())
                    .map(|p| p.to_string())
                    .unwrap_or_default(),
                pointer_to: match layer {
                    Layer::Pointer(p) => Some(p.canonical),
                    Layer::Record(_) => None,
                },
                mount: match layer.callback() {
                    Callback::Mount(child) => child.mount_path(),
                    _ => None,
                },
            })
            .collect()
    }
}

impl fmt::Debug for HandlerStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerStack")
            .field("layers", &self.layers.len())
            .field("live_matchers", &self.live_matchers())
            .field("next_id", &self.next_id)
            .finish()
    }
}
