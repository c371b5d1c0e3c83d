use shrike_core::{KeyType, Value};

use crate::Error;

/// Contiguous f32 storage with a null mask.
#[derive(Clone, Debug, PartialEq)]
pub struct F32Column {
    data: Vec<f32>,
    nulls: Vec<bool>,
}

/// Contiguous i64 storage with a null mask.
#[derive(Clone, Debug, PartialEq)]
pub struct I64Column {
    data: Vec<i64>,
    nulls: Vec<bool>,
}

/// Bool storage with a null mask.
#[derive(Clone, Debug, PartialEq)]
pub struct BoolColumn {
    data: Vec<bool>,
    nulls: Vec<bool>,
}

/// Per-row string storage with a null mask.
#[derive(Clone, Debug, PartialEq)]
pub struct StringColumn {
    data: Vec<String>,
    nulls: Vec<bool>,
}

/// Per-row byte-sequence storage with a null mask.
#[derive(Clone, Debug, PartialEq)]
pub struct BytesColumn {
    data: Vec<Vec<u8>>,
    nulls: Vec<bool>,
}

/// Flat row-major N x D float storage for embeddings.
///
/// A column constructed without a dimension (`dim == 0`) adopts the
/// dimension of the first row written to it.
#[derive(Clone, Debug, PartialEq)]
pub struct F32VecColumn {
    data: Vec<f32>,
    dim: usize,
    nulls: Vec<bool>,
}

macro_rules! scalar_column {
    ($name:ident, $ty:ty) => {
        impl $name {
            /// A column of `len` rows, all null.
            pub fn with_len(len: usize) -> Self {
                Self {
                    data: vec![<$ty>::default(); len],
                    nulls: vec![true; len],
                }
            }

            /// A column initialized from values; no row is null.
            pub fn from_values(data: Vec<$ty>) -> Self {
                let nulls = vec![false; data.len()];
                Self { data, nulls }
            }

            pub fn len(&self) -> usize {
                self.data.len()
            }

            pub fn is_empty(&self) -> bool {
                self.data.is_empty()
            }

            pub fn is_null(&self, row: usize) -> bool {
                self.nulls[row]
            }

            pub fn set_null(&mut self, row: usize) {
                self.nulls[row] = true;
            }

            /// Typed fast-path read. The null mask is not consulted.
            pub fn get(&self, row: usize) -> $ty {
                self.data[row].clone()
            }

            /// Typed fast-path write; clears the null bit.
            pub fn set(&mut self, row: usize, value: $ty) {
                self.data[row] = value;
                self.nulls[row] = false;
            }
        }
    };
}

scalar_column!(F32Column, f32);
scalar_column!(I64Column, i64);
scalar_column!(BoolColumn, bool);
scalar_column!(StringColumn, String);
scalar_column!(BytesColumn, Vec<u8>);

impl F32Column {
    pub fn values(&self) -> &[f32] {
        &self.data
    }
}

impl I64Column {
    pub fn values(&self) -> &[i64] {
        &self.data
    }
}

impl F32VecColumn {
    /// A column of `len` rows with unknown dimension, all null.
    pub fn with_len(len: usize) -> Self {
        Self {
            data: Vec::new(),
            dim: 0,
            nulls: vec![true; len],
        }
    }

    /// A column of `len` rows of dimension `dim`, all null.
    pub fn with_dim(len: usize, dim: usize) -> Self {
        Self {
            data: vec![0.0; len * dim],
            dim,
            nulls: vec![true; len],
        }
    }

    pub fn len(&self) -> usize {
        self.nulls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nulls.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn is_null(&self, row: usize) -> bool {
        self.nulls[row]
    }

    pub fn set_null(&mut self, row: usize) {
        self.nulls[row] = true;
    }

    /// The row as a slice of the flat buffer. Empty while `dim == 0`.
    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.dim..(row + 1) * self.dim]
    }

    /// Write a row, adopting the dimension on the first write.
    pub fn set_row(&mut self, row: usize, values: &[f32]) -> error_stack::Result<(), Error> {
        if self.dim == 0 && !values.is_empty() {
            self.dim = values.len();
            self.data = vec![0.0; self.nulls.len() * self.dim];
        }
        error_stack::ensure!(
            values.len() == self.dim,
            Error::DimensionMismatch {
                expected: self.dim,
                actual: values.len(),
            }
        );
        self.data[row * self.dim..(row + 1) * self.dim].copy_from_slice(values);
        self.nulls[row] = false;
        Ok(())
    }

    /// The entire flat N x D buffer.
    pub fn values(&self) -> &[f32] {
        &self.data
    }

    /// Mutable access to the flat buffer, for bulk fills.
    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Mark every row non-null, for bulk fills through [`values_mut`].
    ///
    /// [`values_mut`]: F32VecColumn::values_mut
    pub fn clear_nulls(&mut self) {
        self.nulls.fill(false);
    }
}

/// A column of a single declared type.
///
/// The variant tag doubles as the runtime type; typed accessors tag-match
/// instead of downcasting, so hot paths never construct a [`Value`].
#[derive(Clone, Debug, PartialEq)]
pub enum TypedColumn {
    F32(F32Column),
    I64(I64Column),
    Bool(BoolColumn),
    String(StringColumn),
    Bytes(BytesColumn),
    F32Vec(F32VecColumn),
}

impl TypedColumn {
    /// A fresh all-null column of `len` rows for the given key type.
    pub fn new(key_type: KeyType, len: usize) -> Self {
        match key_type {
            KeyType::F32 => TypedColumn::F32(F32Column::with_len(len)),
            KeyType::I64 => TypedColumn::I64(I64Column::with_len(len)),
            KeyType::Bool => TypedColumn::Bool(BoolColumn::with_len(len)),
            KeyType::String => TypedColumn::String(StringColumn::with_len(len)),
            KeyType::Bytes => TypedColumn::Bytes(BytesColumn::with_len(len)),
            KeyType::F32Vec => TypedColumn::F32Vec(F32VecColumn::with_len(len)),
        }
    }

    pub fn column_type(&self) -> KeyType {
        match self {
            TypedColumn::F32(_) => KeyType::F32,
            TypedColumn::I64(_) => KeyType::I64,
            TypedColumn::Bool(_) => KeyType::Bool,
            TypedColumn::String(_) => KeyType::String,
            TypedColumn::Bytes(_) => KeyType::Bytes,
            TypedColumn::F32Vec(_) => KeyType::F32Vec,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TypedColumn::F32(c) => c.len(),
            TypedColumn::I64(c) => c.len(),
            TypedColumn::Bool(c) => c.len(),
            TypedColumn::String(c) => c.len(),
            TypedColumn::Bytes(c) => c.len(),
            TypedColumn::F32Vec(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_null(&self, row: usize) -> bool {
        match self {
            TypedColumn::F32(c) => c.is_null(row),
            TypedColumn::I64(c) => c.is_null(row),
            TypedColumn::Bool(c) => c.is_null(row),
            TypedColumn::String(c) => c.is_null(row),
            TypedColumn::Bytes(c) => c.is_null(row),
            TypedColumn::F32Vec(c) => c.is_null(row),
        }
    }

    /// Read a cell as a [`Value`]. Slow path; use the typed accessors in
    /// per-row loops.
    pub fn value(&self, row: usize) -> error_stack::Result<Value, Error> {
        error_stack::ensure!(
            row < self.len(),
            Error::OutOfBounds {
                index: row,
                len: self.len(),
            }
        );
        if self.is_null(row) {
            return Ok(Value::Null);
        }
        Ok(match self {
            TypedColumn::F32(c) => Value::F32(c.get(row)),
            TypedColumn::I64(c) => Value::I64(c.get(row)),
            TypedColumn::Bool(c) => Value::Bool(c.get(row)),
            TypedColumn::String(c) => Value::String(c.get(row)),
            TypedColumn::Bytes(c) => Value::Bytes(c.get(row)),
            TypedColumn::F32Vec(c) => Value::F32Vec(c.row(row).to_vec()),
        })
    }

    /// Write a cell from a [`Value`], enforcing type agreement.
    ///
    /// Null is always accepted and clears the cell.
    pub fn set_value(&mut self, row: usize, value: &Value) -> error_stack::Result<(), Error> {
        error_stack::ensure!(
            row < self.len(),
            Error::OutOfBounds {
                index: row,
                len: self.len(),
            }
        );
        match (self, value) {
            (column, Value::Null) => {
                match column {
                    TypedColumn::F32(c) => c.set_null(row),
                    TypedColumn::I64(c) => c.set_null(row),
                    TypedColumn::Bool(c) => c.set_null(row),
                    TypedColumn::String(c) => c.set_null(row),
                    TypedColumn::Bytes(c) => c.set_null(row),
                    TypedColumn::F32Vec(c) => c.set_null(row),
                }
                Ok(())
            }
            (TypedColumn::F32(c), Value::F32(v)) => {
                c.set(row, *v);
                Ok(())
            }
            (TypedColumn::I64(c), Value::I64(v)) => {
                c.set(row, *v);
                Ok(())
            }
            (TypedColumn::Bool(c), Value::Bool(v)) => {
                c.set(row, *v);
                Ok(())
            }
            (TypedColumn::String(c), Value::String(v)) => {
                c.set(row, v.clone());
                Ok(())
            }
            (TypedColumn::Bytes(c), Value::Bytes(v)) => {
                c.set(row, v.clone());
                Ok(())
            }
            (TypedColumn::F32Vec(c), Value::F32Vec(v)) => c.set_row(row, v),
            (column, value) => error_stack::bail!(Error::TypeMismatch {
                expected: column.column_type().value_type(),
                actual: value.value_type(),
            }),
        }
    }

    pub fn as_f32(&self) -> Option<&F32Column> {
        match self {
            TypedColumn::F32(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&I64Column> {
        match self {
            TypedColumn::I64(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<&BoolColumn> {
        match self {
            TypedColumn::Bool(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&StringColumn> {
        match self {
            TypedColumn::String(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&BytesColumn> {
        match self {
            TypedColumn::Bytes(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_f32vec(&self) -> Option<&F32VecColumn> {
        match self {
            TypedColumn::F32Vec(c) => Some(c),
            _ => None,
        }
    }
}
