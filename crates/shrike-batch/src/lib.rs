//! Typed columnar batches with copy-on-write sharing.
//!
//! A [`ColumnBatch`] maps key ids to shared column handles. Batches are
//! immutable once they leave the operator that created them; the only
//! mutable view is a [`BatchBuilder`], which clones a column on first write
//! and shares every untouched column with its source.
#![warn(
    rust_2018_idioms,
    nonstandard_style,
    future_incompatible,
    clippy::mod_module_files,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::undocumented_unsafe_blocks
)]

pub use batch::*;
pub use builder::*;
pub use column::*;
pub use error::*;

mod batch;
mod builder;
mod column;
mod error;
