use indexmap::IndexMap;
use junction_federation::CompositeSchema;
use junction_federation::IdentityKey;
use junction_federation::KeyEvaluationError;
use junction_federation::KeyValue;
use serde_json::Value;

use super::Cursor;

/// Fragments of the entities met while fusing one merge node, grouped by identity.
///
/// Filled while scanning every backend's contribution, then consumed by [`FusionCache::drain`]:
/// nothing can be read back before the scan is complete.
#[derive(Debug, Default)]
pub(crate) struct FusionCache<'a> {
    entities: IndexMap<KeyValue, Cursor<'a>>,
}

impl<'a> FusionCache<'a> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn evaluate(
        schema: &CompositeSchema,
        key: &IdentityKey,
        backend: &str,
        fragment: &Value,
    ) -> Result<KeyValue, KeyEvaluationError> {
        key.evaluate(schema, backend, fragment)
    }

    /// Records `fragment` as `backend`'s view of the entity identified by `key`.
    ///
    /// When a backend returns the same entity twice, its last fragment wins.
    pub(crate) fn record(&mut self, key: KeyValue, backend: &'a str, fragment: &'a Value) {
        self.entities.entry(key).or_default().insert(backend, fragment);
    }

    /// Entities in first-seen order, each with the fragments of every backend that returned it.
    pub(crate) fn drain(self) -> impl Iterator<Item = (KeyValue, Cursor<'a>)> {
        self.entities.into_iter()
    }
}
