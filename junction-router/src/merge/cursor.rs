use indexmap::IndexMap;
use serde_json::Value;

/// Where, in each contributing backend's response, the data for one query tree node is.
///
/// Positions keep backend insertion order, which is the order contributions are merged in.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Cursor<'a> {
    positions: IndexMap<&'a str, &'a Value>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Sets the position for `backend`; a later position replaces an earlier one in place.
    pub(crate) fn insert(&mut self, backend: &'a str, value: &'a Value) {
        self.positions.insert(backend, value);
    }

    pub(crate) fn len(&self) -> usize {
        self.positions.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Value)> + '_ {
        self.positions.iter().map(|(backend, value)| (*backend, *value))
    }

    /// The first position, if any.
    pub(crate) fn first(&self) -> Option<(&'a str, &'a Value)> {
        self.positions
            .first()
            .map(|(backend, value)| (*backend, *value))
    }

    /// The positions of the backends accepted by `predicate`.
    pub(crate) fn restrict(&self, mut predicate: impl FnMut(&str) -> bool) -> Cursor<'a> {
        self.iter().filter(|(backend, _)| predicate(backend)).collect()
    }
}

impl<'a> FromIterator<(&'a str, &'a Value)> for Cursor<'a> {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a Value)>>(iter: I) -> Self {
        Self {
            positions: iter.into_iter().collect(),
        }
    }
}
