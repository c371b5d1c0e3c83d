use std::sync::Arc;

use hashbrown::HashMap;
use itertools::Itertools;
use shrike_core::{KeyType, Value};

use crate::{Error, F32Column, F32VecColumn, I64Column, TypedColumn};

/// A shared, immutable column handle.
///
/// Batches share columns by handle; the copy-on-write contract is
/// observable (and tested) through handle identity and strong counts.
pub type ColumnHandle = Arc<TypedColumn>;

/// A batch of rows stored as typed columns keyed by key id.
///
/// Every contained column has `len() >= row_count`. Batches are cheap to
/// clone -- the column map holds `Arc` handles -- and become read-only as
/// soon as they leave the operator that created them.
#[derive(Clone, Debug, Default)]
pub struct ColumnBatch {
    row_count: usize,
    columns: HashMap<i32, ColumnHandle>,
}

impl ColumnBatch {
    /// An empty batch with zero rows and no columns.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A batch of `row_count` rows with no columns yet.
    pub fn with_row_count(row_count: usize) -> Self {
        Self {
            row_count,
            columns: HashMap::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn has_column(&self, key_id: i32) -> bool {
        self.columns.contains_key(&key_id)
    }

    pub fn column(&self, key_id: i32) -> Option<&ColumnHandle> {
        self.columns.get(&key_id)
    }

    /// Install or replace a column handle.
    pub fn set_column(
        &mut self,
        key_id: i32,
        column: ColumnHandle,
    ) -> error_stack::Result<(), Error> {
        error_stack::ensure!(
            column.len() >= self.row_count,
            Error::LengthMismatch {
                expected: self.row_count,
                actual: column.len(),
            }
        );
        self.columns.insert(key_id, column);
        Ok(())
    }

    /// Read a cell. Missing columns and out-of-range rows read as null.
    pub fn value(&self, row: usize, key_id: i32) -> Value {
        match self.columns.get(&key_id) {
            Some(column) => column.value(row).unwrap_or(Value::Null),
            None => Value::Null,
        }
    }

    /// Key ids of all columns, sorted for deterministic iteration.
    pub fn column_keys(&self) -> Vec<i32> {
        self.columns.keys().copied().sorted().collect()
    }

    /// The strong count of a column handle; 0 if absent. Test hook for the
    /// copy-on-write sharing contract.
    pub fn handle_count(&self, key_id: i32) -> usize {
        self.columns
            .get(&key_id)
            .map(Arc::strong_count)
            .unwrap_or(0)
    }

    pub fn f32_column(&self, key_id: i32) -> Option<&F32Column> {
        self.columns.get(&key_id).and_then(|c| c.as_f32())
    }

    pub fn i64_column(&self, key_id: i32) -> Option<&I64Column> {
        self.columns.get(&key_id).and_then(|c| c.as_i64())
    }

    pub fn f32vec_column(&self, key_id: i32) -> Option<&F32VecColumn> {
        self.columns.get(&key_id).and_then(|c| c.as_f32vec())
    }
}

/// Concatenate batches row-wise.
///
/// Columns with the same key are unioned; cells for batches missing a key
/// are null. A key declared with different column types across inputs is a
/// programmer error.
pub fn concat(batches: &[ColumnBatch]) -> error_stack::Result<ColumnBatch, Error> {
    let total_rows: usize = batches.iter().map(ColumnBatch::row_count).sum();

    let all_keys: Vec<i32> = batches
        .iter()
        .flat_map(|batch| batch.column_keys())
        .unique()
        .sorted()
        .collect();

    let mut result = ColumnBatch::with_row_count(total_rows);
    for key_id in all_keys {
        let column_type = column_type_for(batches, key_id)?;
        let mut column = match column_type {
            // Preserve the source dimension so empty inputs don't reset it.
            KeyType::F32Vec => {
                let dim = batches
                    .iter()
                    .filter_map(|b| b.f32vec_column(key_id))
                    .map(F32VecColumn::dim)
                    .find(|&d| d > 0)
                    .unwrap_or(0);
                if dim > 0 {
                    TypedColumn::F32Vec(F32VecColumn::with_dim(total_rows, dim))
                } else {
                    TypedColumn::new(KeyType::F32Vec, total_rows)
                }
            }
            other => TypedColumn::new(other, total_rows),
        };

        let mut offset = 0;
        for batch in batches {
            if let Some(source) = batch.column(key_id) {
                for row in 0..batch.row_count() {
                    if !source.is_null(row) {
                        let value = source.value(row)?;
                        column.set_value(offset + row, &value)?;
                    }
                }
            }
            offset += batch.row_count();
        }
        result.set_column(key_id, Arc::new(column))?;
    }

    Ok(result)
}

fn column_type_for(
    batches: &[ColumnBatch],
    key_id: i32,
) -> error_stack::Result<KeyType, Error> {
    let mut found: Option<KeyType> = None;
    for batch in batches {
        if let Some(column) = batch.column(key_id) {
            let column_type = column.column_type();
            match found {
                None => found = Some(column_type),
                Some(existing) if existing != column_type => {
                    error_stack::bail!(Error::Internal(format!(
                        "conflicting column types for key {key_id}: {existing} vs {column_type}"
                    )))
                }
                Some(_) => {}
            }
        }
    }
    found.ok_or_else(|| {
        error_stack::Report::new(Error::Internal(format!(
            "key {key_id} present in no input batch"
        )))
    })
}
