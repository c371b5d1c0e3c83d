use std::sync::Arc;

use hashbrown::HashMap;
use shrike_core::{KeyRegistry, Value};

use crate::{ColumnBatch, Error, TypedColumn};

/// Builds a new [`ColumnBatch`] from a source with copy-on-write semantics.
///
/// Writes accumulate in owned columns; the first write to a key clones the
/// source column (or allocates a fresh all-null one). [`build`] produces a
/// batch that shares the *same handle* as the source for every untouched
/// key.
///
/// [`build`]: BatchBuilder::build
pub struct BatchBuilder<'a> {
    source: Option<&'a ColumnBatch>,
    registry: Option<&'a KeyRegistry>,
    row_count: usize,
    modified: HashMap<i32, TypedColumn>,
}

impl<'a> BatchBuilder<'a> {
    /// A builder for a new batch of `row_count` rows with no source.
    pub fn new(row_count: usize) -> Self {
        Self {
            source: None,
            registry: None,
            row_count,
            modified: HashMap::new(),
        }
    }

    /// A builder over a source batch. The source is never modified.
    pub fn from_source(source: &'a ColumnBatch) -> Self {
        Self {
            source: Some(source),
            registry: None,
            row_count: source.row_count(),
            modified: HashMap::new(),
        }
    }

    /// Enable registry validation: writes require the key to exist and the
    /// value's runtime type to equal the declared type.
    pub fn with_registry(mut self, registry: &'a KeyRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_modified(&self, key_id: i32) -> bool {
        self.modified.contains_key(&key_id)
    }

    /// Write one cell, cloning the source column on the first touch.
    pub fn set(
        &mut self,
        row: usize,
        key_id: i32,
        value: Value,
    ) -> error_stack::Result<(), Error> {
        error_stack::ensure!(
            row < self.row_count,
            Error::OutOfBounds {
                index: row,
                len: self.row_count,
            }
        );
        if let Some(registry) = self.registry {
            let key = registry
                .key(key_id)
                .ok_or_else(|| error_stack::Report::new(Error::UnknownKey(key_id)))?;
            error_stack::ensure!(
                key.key_type.accepts(&value),
                Error::TypeMismatch {
                    expected: key.key_type.value_type(),
                    actual: value.value_type(),
                }
            );
        }
        let column = self.writable_column(key_id, &value)?;
        column.set_value(row, &value)
    }

    /// Install a fully-formed column for a key, replacing any prior writes.
    pub fn add_column(
        &mut self,
        key_id: i32,
        column: TypedColumn,
    ) -> error_stack::Result<(), Error> {
        error_stack::ensure!(
            column.len() == self.row_count,
            Error::LengthMismatch {
                expected: self.row_count,
                actual: column.len(),
            }
        );
        self.modified.insert(key_id, column);
        Ok(())
    }

    /// Get (allocating on first touch) the owned column for `key_id`.
    fn writable_column(
        &mut self,
        key_id: i32,
        value: &Value,
    ) -> error_stack::Result<&mut TypedColumn, Error> {
        if !self.modified.contains_key(&key_id) {
            let column = if let Some(existing) =
                self.source.and_then(|source| source.column(key_id))
            {
                existing.as_ref().clone()
            } else {
                let key_type = match self.registry.and_then(|r| r.key(key_id)) {
                    Some(key) => key.key_type,
                    None => match key_type_of(value) {
                        Some(key_type) => key_type,
                        None => error_stack::bail!(Error::Internal(format!(
                            "cannot infer column type for null write to unknown key {key_id}"
                        ))),
                    },
                };
                TypedColumn::new(key_type, self.row_count)
            };
            self.modified.insert(key_id, column);
        }
        Ok(self
            .modified
            .get_mut(&key_id)
            .expect("column inserted above"))
    }

    /// Produce the final batch. The builder is consumed.
    pub fn build(self) -> ColumnBatch {
        let mut batch = ColumnBatch::with_row_count(self.row_count);
        if let Some(source) = self.source {
            for key_id in source.column_keys() {
                if !self.modified.contains_key(&key_id) {
                    if let Some(handle) = source.column(key_id) {
                        // Untouched columns share the source handle.
                        batch
                            .set_column(key_id, Arc::clone(handle))
                            .expect("source column length validated at insert");
                    }
                }
            }
        }
        for (key_id, column) in self.modified {
            batch
                .set_column(key_id, Arc::new(column))
                .expect("modified column length validated at insert");
        }
        batch
    }
}

/// The declared type a non-null value would occupy.
fn key_type_of(value: &Value) -> Option<shrike_core::KeyType> {
    use shrike_core::KeyType;
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(KeyType::Bool),
        Value::I64(_) => Some(KeyType::I64),
        Value::F32(_) => Some(KeyType::F32),
        Value::String(_) => Some(KeyType::String),
        Value::Bytes(_) => Some(KeyType::Bytes),
        Value::F32Vec(_) => Some(KeyType::F32Vec),
    }
}
