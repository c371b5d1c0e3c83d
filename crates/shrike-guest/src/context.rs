use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashSet;
use shrike_batch::{BatchBuilder, ColumnBatch, F32Column, F32VecColumn, I64Column, TypedColumn};
use shrike_core::{KeyRegistry, KeyType};

use crate::{BudgetTracker, Error};

/// A column allocated by a guest writer call.
///
/// The cells live in an interpreter-shared buffer; the host copies them
/// into a typed column at commit time (the interpreter cannot be trusted to
/// keep host storage alive and unaliased across its GC).
#[derive(Clone, Debug)]
pub enum AllocatedColumn {
    F32 {
        key_id: i32,
        cells: Rc<RefCell<Vec<f64>>>,
    },
    I64 {
        key_id: i32,
        cells: Rc<RefCell<Vec<i64>>>,
    },
    F32Vec {
        key_id: i32,
        dim: usize,
        cells: Rc<RefCell<Vec<f64>>>,
    },
}

/// The gated host view a guest module reads and writes through.
///
/// Readers hand out copies of column data; writers allocate fresh buffers
/// after the declared-write, registry-type, and budget gates all pass.
pub struct BatchContext {
    batch: ColumnBatch,
    registry: KeyRegistry,
    allowed_writes: HashSet<i32>,
    budget: BudgetTracker,
    allocated: Vec<AllocatedColumn>,
}

impl BatchContext {
    pub fn new(
        batch: ColumnBatch,
        registry: KeyRegistry,
        allowed_writes: HashSet<i32>,
        budget: BudgetTracker,
    ) -> Self {
        Self {
            batch,
            registry,
            allowed_writes,
            budget,
            allocated: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.batch.row_count()
    }

    pub fn budget(&mut self) -> &mut BudgetTracker {
        &mut self.budget
    }

    /// Raw f32 cells of a column; null cells read as their zero fill.
    pub fn f32_cells(&self, key_id: i32) -> Option<Vec<f64>> {
        self.batch
            .f32_column(key_id)
            .map(|column| column.values().iter().map(|&v| f64::from(v)).collect())
    }

    pub fn i64_cells(&self, key_id: i32) -> Option<Vec<i64>> {
        self.batch
            .i64_column(key_id)
            .map(|column| column.values().to_vec())
    }

    /// The flat N x D view of an f32vec column: `(cells, dim, row_count)`.
    pub fn f32vec_cells(&self, key_id: i32) -> Option<(Vec<f64>, usize, usize)> {
        self.batch.f32vec_column(key_id).map(|column| {
            (
                column.values().iter().map(|&v| f64::from(v)).collect(),
                column.dim(),
                column.len(),
            )
        })
    }

    /// Allocate a writable f32 buffer for `key_id`, enforcing in order: the
    /// declared write set, the registry type, and the write budget.
    pub fn allocate_f32(&mut self, key_id: i32) -> Result<Rc<RefCell<Vec<f64>>>, Error> {
        self.check_write(key_id, KeyType::F32)?;
        let rows = self.batch.row_count();
        self.budget
            .charge_write(rows as i64 * std::mem::size_of::<f32>() as i64, rows as i64)?;
        let cells = Rc::new(RefCell::new(vec![0.0f64; rows]));
        self.allocated.push(AllocatedColumn::F32 {
            key_id,
            cells: Rc::clone(&cells),
        });
        Ok(cells)
    }

    /// Allocate a writable i64 buffer for `key_id`; same gates as f32.
    pub fn allocate_i64(&mut self, key_id: i32) -> Result<Rc<RefCell<Vec<i64>>>, Error> {
        self.check_write(key_id, KeyType::I64)?;
        let rows = self.batch.row_count();
        self.budget
            .charge_write(rows as i64 * std::mem::size_of::<i64>() as i64, rows as i64)?;
        let cells = Rc::new(RefCell::new(vec![0i64; rows]));
        self.allocated.push(AllocatedColumn::I64 {
            key_id,
            cells: Rc::clone(&cells),
        });
        Ok(cells)
    }

    /// Allocate a writable flat N x D f32vec buffer for `key_id`.
    pub fn allocate_f32vec(
        &mut self,
        key_id: i32,
        dim: usize,
    ) -> Result<Rc<RefCell<Vec<f64>>>, Error> {
        self.check_write(key_id, KeyType::F32Vec)?;
        let rows = self.batch.row_count();
        self.budget.charge_write(
            (rows * dim) as i64 * std::mem::size_of::<f32>() as i64,
            rows as i64,
        )?;
        let cells = Rc::new(RefCell::new(vec![0.0f64; rows * dim]));
        self.allocated.push(AllocatedColumn::F32Vec {
            key_id,
            dim,
            cells: Rc::clone(&cells),
        });
        Ok(cells)
    }

    fn check_write(&self, key_id: i32, requested: KeyType) -> Result<(), Error> {
        if !self.allowed_writes.contains(&key_id) {
            return Err(Error::WriteNotDeclared(key_id));
        }
        let key = self.registry.key(key_id).ok_or(Error::UnknownKey(key_id))?;
        if key.key_type != requested {
            return Err(Error::TypeMismatch {
                key_id,
                declared: key.key_type,
                requested,
            });
        }
        Ok(())
    }

    pub fn has_writes(&self) -> bool {
        !self.allocated.is_empty()
    }

    /// Copy every writer buffer back into a typed host column and install
    /// it in the builder.
    pub fn commit_into(&mut self, builder: &mut BatchBuilder<'_>) -> Result<(), Error> {
        for allocated in self.allocated.drain(..) {
            let (key_id, column) = match allocated {
                AllocatedColumn::F32 { key_id, cells } => {
                    let values = cells.borrow().iter().map(|&v| v as f32).collect();
                    (key_id, TypedColumn::F32(F32Column::from_values(values)))
                }
                AllocatedColumn::I64 { key_id, cells } => {
                    let values = cells.borrow().clone();
                    (key_id, TypedColumn::I64(I64Column::from_values(values)))
                }
                AllocatedColumn::F32Vec { key_id, dim, cells } => {
                    let rows = if dim > 0 { cells.borrow().len() / dim } else { 0 };
                    let mut column = F32VecColumn::with_dim(rows, dim);
                    for (cell, value) in
                        column.values_mut().iter_mut().zip(cells.borrow().iter())
                    {
                        *cell = *value as f32;
                    }
                    column.clear_nulls();
                    (key_id, TypedColumn::F32Vec(column))
                }
            };
            builder
                .add_column(key_id, column)
                .map_err(|report| Error::Guest(report.to_string()))?;
        }
        Ok(())
    }
}
