//! Merging per-backend responses into one document.
//!
//! The merge walks the composite query tree once. At every node it holds a [`Cursor`] on the
//! backends' responses and a [`MergeMode`] saying how the node is written: from a single backend,
//! or combined from several by concatenation or by fusing entities that share an identity key.
//! Output goes straight to a [`JsonWriter`].

mod cursor;
mod fusion;

use std::borrow::Cow;

use junction_federation::CompositeSchema;
use junction_federation::IdentityKey;
use junction_federation::LocalName;
use junction_federation::QueryField;
use serde_json::Value;

pub(crate) use self::cursor::Cursor;
use self::fusion::FusionCache;
use crate::error::MergeError;
use crate::json_writer::JsonWriter;
use crate::json_writer::Sink;

/// A backend and one of its values.
type Contribution<'a> = (&'a str, &'a Value);

/// How one node of the query tree is written.
#[derive(Debug)]
pub(crate) enum MergeMode<'a> {
    /// A scalar from one backend, written as is.
    Value(&'a Value),
    /// A field answered by one backend, looked up through its local names in `parent`.
    LocalField {
        backend: &'a str,
        parent: &'a Value,
        field: &'a QueryField,
    },
    /// A list of objects from one backend.
    ObjectArray {
        backend: &'a str,
        items: Vec<&'a Value>,
        field: &'a QueryField,
    },
    /// A list of scalars from one backend.
    ValueArray { items: Vec<&'a Value> },
    /// An object from one backend.
    LocalObject {
        backend: &'a str,
        value: &'a Value,
        selections: &'a [QueryField],
    },
    /// An object several backends contribute fields to.
    MergedObject {
        cursor: Cursor<'a>,
        selections: &'a [QueryField],
    },
    /// A field several backends answer.
    MergedField {
        cursor: Cursor<'a>,
        field: &'a QueryField,
    },
    /// Scalars of several backends, concatenated.
    MergedValueArray { contributions: Vec<Contribution<'a>> },
    /// Keyless objects of several backends, concatenated.
    MergedObjectConcatArray {
        contributions: Vec<Contribution<'a>>,
        field: &'a QueryField,
    },
    /// Keyed objects of several backends, fused by identity.
    MergedObjectFuseArray {
        contributions: Vec<Contribution<'a>>,
        field: &'a QueryField,
        key: &'a IdentityKey,
    },
}

/// Writes the merge of the backend responses under `cursor` for `selections`.
///
/// `cursor` holds the `data` object of every backend that answered.
pub(crate) fn merge<'a, S: Sink>(
    schema: &'a CompositeSchema,
    selections: &'a [QueryField],
    cursor: Cursor<'a>,
    writer: &mut JsonWriter<S>,
) -> Result<(), MergeError> {
    Merger { schema, writer }.advance(MergeMode::MergedObject { cursor, selections })
}

struct Merger<'a, 'w, S> {
    schema: &'a CompositeSchema,
    writer: &'w mut JsonWriter<S>,
}

impl<'a, 'w, S: Sink> Merger<'a, 'w, S> {
    fn advance(&mut self, mode: MergeMode<'a>) -> Result<(), MergeError> {
        match mode {
            MergeMode::Value(value) => self.writer.value(value),
            MergeMode::LocalField {
                backend,
                parent,
                field,
            } => self.local_field(backend, parent, field),
            MergeMode::ObjectArray {
                backend,
                items,
                field,
            } => self.object_array(backend, items, field),
            MergeMode::ValueArray { items } => self.value_array(items),
            MergeMode::LocalObject {
                backend,
                value,
                selections,
            } => self.local_object(backend, value, selections),
            MergeMode::MergedObject { cursor, selections } => {
                self.merged_object(cursor, selections)
            }
            MergeMode::MergedField { cursor, field } => self.merged_field(cursor, field),
            MergeMode::MergedValueArray { contributions } => {
                self.merged_value_array(contributions)
            }
            MergeMode::MergedObjectConcatArray {
                contributions,
                field,
            } => self.concat_objects(contributions, field),
            MergeMode::MergedObjectFuseArray {
                contributions,
                field,
                key,
            } => self.fuse_objects(contributions, field, key),
        }
    }

    fn local_field(
        &mut self,
        backend: &'a str,
        parent: &'a Value,
        field: &'a QueryField,
    ) -> Result<(), MergeError> {
        let local_names = self.schema.local_names(backend, field.coordinate());
        let values: Vec<&'a Value> = local_names
            .iter()
            .filter_map(|local_name| {
                parent.get(self.backend_key(backend, local_name, field).as_ref())
            })
            .filter(|value| !value.is_null())
            .collect();

        let Some(first) = values.first().copied() else {
            return self.writer.null();
        };

        if field.is_list_valued() {
            // every local name adds its elements to the one list
            let items = values.into_iter().flat_map(elements).collect();
            return if field.is_object_valued() {
                self.advance(MergeMode::ObjectArray {
                    backend,
                    items,
                    field,
                })
            } else {
                self.advance(MergeMode::ValueArray { items })
            };
        }

        if field.is_object_valued() {
            self.advance(MergeMode::LocalObject {
                backend,
                value: first,
                selections: field.selections(),
            })
        } else {
            self.advance(MergeMode::Value(first))
        }
    }

    fn object_array(
        &mut self,
        backend: &'a str,
        items: Vec<&'a Value>,
        field: &'a QueryField,
    ) -> Result<(), MergeError> {
        self.writer.begin_array()?;
        for value in items {
            self.advance(MergeMode::LocalObject {
                backend,
                value,
                selections: field.selections(),
            })?;
        }
        self.writer.end_array()
    }

    fn value_array(&mut self, items: Vec<&'a Value>) -> Result<(), MergeError> {
        self.writer.begin_array()?;
        for value in items {
            self.advance(MergeMode::Value(value))?;
        }
        self.writer.end_array()
    }

    fn local_object(
        &mut self,
        backend: &'a str,
        value: &'a Value,
        selections: &'a [QueryField],
    ) -> Result<(), MergeError> {
        match value {
            Value::Object(_) => {}
            Value::Null => return self.writer.null(),
            other => {
                failfast_debug!(backend, value = %other, "expected an object");
                return self.writer.null();
            }
        }

        self.writer.begin_object()?;
        for child in selections {
            self.writer.key(child.response_key())?;
            self.advance(MergeMode::LocalField {
                backend,
                parent: value,
                field: child,
            })?;
        }
        self.writer.end_object()
    }

    fn merged_object(
        &mut self,
        cursor: Cursor<'a>,
        selections: &'a [QueryField],
    ) -> Result<(), MergeError> {
        self.writer.begin_object()?;
        for child in selections {
            self.writer.key(child.response_key())?;

            let schema = self.schema;
            let can_deliver = cursor.restrict(|backend| {
                !schema.local_names(backend, child.coordinate()).is_empty()
            });
            match (can_deliver.len(), can_deliver.first()) {
                (1, Some((backend, parent))) => self.advance(MergeMode::LocalField {
                    backend,
                    parent,
                    field: child,
                })?,
                (0, _) | (_, None) => self.writer.null()?,
                _ => self.advance(MergeMode::MergedField {
                    cursor: can_deliver,
                    field: child,
                })?,
            }
        }
        self.writer.end_object()
    }

    fn merged_field(
        &mut self,
        cursor: Cursor<'a>,
        field: &'a QueryField,
    ) -> Result<(), MergeError> {
        let mut answered = false;
        let mut contributions: Vec<Contribution<'a>> = Vec::new();
        for (backend, parent) in cursor.iter() {
            for local_name in self.schema.local_names(backend, field.coordinate()) {
                match parent.get(self.backend_key(backend, local_name, field).as_ref()) {
                    None | Some(Value::Null) => continue,
                    Some(value) if field.is_list_valued() => {
                        contributions.extend(elements(value).map(|item| (backend, item)))
                    }
                    Some(value) => contributions.push((backend, value)),
                }
                answered = true;
            }
        }

        // empty lists stay empty lists
        if !answered {
            return self.writer.null();
        }

        let key = self.schema.identity_key(field.target_type());
        match (field.is_object_valued(), key) {
            (true, Some(key)) => self.advance(MergeMode::MergedObjectFuseArray {
                contributions,
                field,
                key,
            }),
            (true, None) if field.is_list_valued() => {
                self.advance(MergeMode::MergedObjectConcatArray {
                    contributions,
                    field,
                })
            }
            // one keyless object answered by several backends: merge field by field
            (true, None) => self.advance(MergeMode::MergedObject {
                cursor: contributions.into_iter().collect(),
                selections: field.selections(),
            }),
            (false, _) if field.is_list_valued() => {
                self.advance(MergeMode::MergedValueArray { contributions })
            }
            (false, _) => {
                if contributions.len() > 1 {
                    tracing::trace!(
                        field = %field.coordinate(),
                        "several backends answered a scalar, keeping the first"
                    );
                }
                match contributions.first() {
                    Some(&(_, value)) => self.advance(MergeMode::Value(value)),
                    None => self.writer.null(),
                }
            }
        }
    }

    fn merged_value_array(
        &mut self,
        contributions: Vec<Contribution<'a>>,
    ) -> Result<(), MergeError> {
        self.writer.begin_array()?;
        for (_, value) in contributions {
            self.advance(MergeMode::Value(value))?;
        }
        self.writer.end_array()
    }

    fn concat_objects(
        &mut self,
        contributions: Vec<Contribution<'a>>,
        field: &'a QueryField,
    ) -> Result<(), MergeError> {
        self.writer.begin_array()?;
        for (backend, value) in contributions {
            self.advance(MergeMode::LocalObject {
                backend,
                value,
                selections: field.selections(),
            })?;
        }
        self.writer.end_array()
    }

    fn fuse_objects(
        &mut self,
        contributions: Vec<Contribution<'a>>,
        field: &'a QueryField,
        key: &'a IdentityKey,
    ) -> Result<(), MergeError> {
        let mut cache = FusionCache::new();
        for (backend, fragment) in contributions {
            if fragment.is_null() {
                continue;
            }
            let key_value = FusionCache::evaluate(self.schema, key, backend, fragment)?;
            cache.record(key_value, backend, fragment);
        }

        let mut entities = cache.drain().map(|(_, fused)| fused);
        if !field.is_list_valued() {
            let Some(entity) = entities.next() else {
                return self.writer.null();
            };
            let dropped = entities.count();
            if dropped > 0 {
                failfast_debug!(
                    field = %field.coordinate(),
                    dropped,
                    "backends disagree on the identity of a single entity, keeping the first"
                );
            }
            return self.fused_entity(entity, field);
        }

        self.writer.begin_array()?;
        for entity in entities {
            self.fused_entity(entity, field)?;
        }
        self.writer.end_array()
    }

    fn fused_entity(
        &mut self,
        entity: Cursor<'a>,
        field: &'a QueryField,
    ) -> Result<(), MergeError> {
        match (entity.len(), entity.first()) {
            (1, Some((backend, value))) => self.advance(MergeMode::LocalObject {
                backend,
                value,
                selections: field.selections(),
            }),
            (_, None) => self.writer.null(),
            _ => self.advance(MergeMode::MergedObject {
                cursor: entity,
                selections: field.selections(),
            }),
        }
    }

    /// Key of `field` in a fragment of `backend`, as the splitter asked for it.
    fn backend_key(
        &self,
        backend: &str,
        local_name: &'a LocalName,
        field: &'a QueryField,
    ) -> Cow<'a, str> {
        let display_name = match self.schema.backend(backend) {
            Some(backend) => backend.display_name(local_name),
            None => local_name.field_name(),
        };
        field.backend_key(display_name)
    }
}

/// The elements of a list contribution; a lone value stands for itself.
fn elements(value: &Value) -> Box<dyn Iterator<Item = &Value> + '_> {
    match value {
        Value::Array(items) => Box::new(items.iter()),
        other => Box::new(std::iter::once(other)),
    }
}
