use crate::Error;

/// Declared resource limits for one module invocation.
///
/// An IO limit of 0 disables IO entirely -- the first byte or row read
/// already exceeds it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BudgetLimits {
    pub max_write_bytes: i64,
    pub max_write_cells: i64,
    /// Legacy per-row write cap from the row-level API; parsed and carried
    /// but not enforced on the columnar path.
    pub max_set_per_obj: i64,
    pub max_io_read_bytes: i64,
    pub max_io_read_rows: i64,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            max_write_bytes: 1 << 20,
            max_write_cells: 100_000,
            max_set_per_obj: 10,
            max_io_read_bytes: 0,
            max_io_read_rows: 0,
        }
    }
}

/// Running totals charged against [`BudgetLimits`].
///
/// Charges are checked *before* being accepted, so a failed charge leaves
/// the totals untouched and nothing partially committed.
#[derive(Clone, Debug)]
pub struct BudgetTracker {
    limits: BudgetLimits,
    bytes_written: i64,
    cells_written: i64,
    io_bytes_read: i64,
    io_rows_read: i64,
}

impl BudgetTracker {
    pub fn new(limits: BudgetLimits) -> Self {
        Self {
            limits,
            bytes_written: 0,
            cells_written: 0,
            io_bytes_read: 0,
            io_rows_read: 0,
        }
    }

    pub fn limits(&self) -> &BudgetLimits {
        &self.limits
    }

    /// Charge a column allocation against the write budget.
    pub fn charge_write(&mut self, bytes: i64, cells: i64) -> Result<(), Error> {
        if self.bytes_written + bytes > self.limits.max_write_bytes {
            return Err(Error::BudgetExceeded {
                what: "max_write_bytes",
                limit: self.limits.max_write_bytes,
            });
        }
        if self.cells_written + cells > self.limits.max_write_cells {
            return Err(Error::BudgetExceeded {
                what: "max_write_cells",
                limit: self.limits.max_write_cells,
            });
        }
        self.bytes_written += bytes;
        self.cells_written += cells;
        Ok(())
    }

    /// Charge bytes read and rows parsed against the IO budget.
    pub fn charge_io(&mut self, bytes: i64, rows: i64) -> Result<(), Error> {
        if self.io_bytes_read + bytes > self.limits.max_io_read_bytes {
            return Err(Error::IoBudgetExceeded {
                what: "max_io_read_bytes",
                limit: self.limits.max_io_read_bytes,
            });
        }
        if self.io_rows_read + rows > self.limits.max_io_read_rows {
            return Err(Error::IoBudgetExceeded {
                what: "max_io_read_rows",
                limit: self.limits.max_io_read_rows,
            });
        }
        self.io_bytes_read += bytes;
        self.io_rows_read += rows;
        Ok(())
    }
}
