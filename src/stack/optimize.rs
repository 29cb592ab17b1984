use super::core::{HandlerStack, Layer, PointerRecord};
use tracing::debug;

impl HandlerStack {
    /// Collapse records at `start..` onto earlier structurally equal records.
    ///
    /// Returns how many records were rewritten into pointers.
    pub fn optimize(&mut self, start: usize) -> usize {
        let mut rewritten = 0;

        for i in start..self.layers.len() {
            let Layer::Record(record) = &self.layers[i] else {
                continue;
            };
            let Some(pattern) = self.pattern(record.matcher) else {
                continue;
            };

            let canonical = self.layers[..i].iter().find_map(|earlier| match earlier {
                Layer::Record(r) => self
                    .pattern(r.matcher)
                    .filter(|p| p.structurally_eq(pattern))
                    .map(|_| (r.id, r.matcher)),
                Layer::Pointer(_) => None,
            });

            let Some((canonical_id, canonical_matcher)) = canonical else {
                continue;
            };

            let Layer::Record(record) = self.layers[i].clone() else {
                continue;
            };
            // O1: Record collapsed onto an earlier matcher
            debug!(
                record_id = record.id,
                canonical_id = canonical_id,
                matcher = canonical_matcher,
                "Record rewritten to pointer"
            );
            self.matchers[record.matcher] = None;
            self.layers[i] = Layer::Pointer(PointerRecord {
                id: record.id,
                canonical: canonical_id,
                matcher: canonical_matcher,
                method: record.method,
                callback: record.callback,
            });
            rewritten += 1;
        }

        rewritten
    }
}
