use error_stack::ResultExt;
use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use itertools::Itertools;
use shrike_batch::{BatchBuilder, ColumnBatch, TypedColumn};
use shrike_core::keys;

use crate::params::str_or;
use crate::{
    Error, ExecContext, InputMode, NodeSpec, Operator, OperatorFactory, Stability,
    WritesDescriptor,
};

inventory::submit!(OperatorFactory {
    spec: NodeSpec {
        op: "core:merge",
        namespace_path: "core.merge",
        stability: Stability::Stable,
        doc: "Concatenates inputs and deduplicates rows by candidate id.",
        input_mode: InputMode::Concat,
        params_schema: r#"{
            "type": "object",
            "properties": {
                "dedup": {"type": "string", "enum": ["first", "max_base"]}
            }
        }"#,
        reads: &[keys::id::CAND_CANDIDATE_ID, keys::id::SCORE_BASE],
        writes: WritesDescriptor::Static(&[]),
    },
    create: &|| Box::new(Merge),
});

#[derive(Clone, Copy, PartialEq, Eq)]
enum Dedup {
    First,
    MaxBase,
}

/// `core:merge` -- groups the (already concatenated) input by candidate id
/// and keeps one row per id.
///
/// Rows with a missing or null candidate id are skipped. Output rows follow
/// the sorted input-index order of the kept rows; because the row set
/// changes, every column is materialised fresh rather than shared.
pub struct Merge;

impl Operator for Merge {
    fn run(
        &self,
        _ctx: &ExecContext<'_>,
        input: &ColumnBatch,
        params: &serde_json::Value,
    ) -> error_stack::Result<ColumnBatch, Error> {
        let dedup = match str_or(params, "dedup", "first") {
            "first" => Dedup::First,
            "max_base" => Dedup::MaxBase,
            other => error_stack::bail!(Error::InvalidParam {
                op: "core:merge",
                param: "dedup",
                reason: format!("expected 'first' or 'max_base', got '{other}'"),
            }),
        };

        let ids = input.i64_column(keys::id::CAND_CANDIDATE_ID);
        let base = input.f32_column(keys::id::SCORE_BASE);

        // Winning input row per candidate id.
        let mut best: HashMap<i64, usize> = HashMap::new();
        for row in 0..input.row_count() {
            let Some(id) = ids.filter(|ids| !ids.is_null(row)).map(|ids| ids.get(row))
            else {
                continue;
            };
            match best.entry(id) {
                Entry::Vacant(entry) => {
                    entry.insert(row);
                }
                Entry::Occupied(mut entry) => {
                    if dedup == Dedup::MaxBase
                        && read_base(base, row) > read_base(base, *entry.get())
                    {
                        entry.insert(row);
                    }
                }
            }
        }

        let kept: Vec<usize> = best.values().copied().sorted().collect();

        let mut builder = BatchBuilder::new(kept.len());
        for key_id in input.column_keys() {
            let source = input
                .column(key_id)
                .expect("column_keys returns present keys");
            let column = select_rows(source, &kept).change_context(Error::Batch)?;
            builder.add_column(key_id, column).change_context(Error::Batch)?;
        }
        Ok(builder.build())
    }
}

fn read_base(column: Option<&shrike_batch::F32Column>, row: usize) -> f32 {
    column
        .filter(|column| !column.is_null(row))
        .map(|column| column.get(row))
        .unwrap_or(0.0)
}

/// Materialise a fresh column containing `rows` of `source`, in order.
fn select_rows(
    source: &TypedColumn,
    rows: &[usize],
) -> error_stack::Result<TypedColumn, shrike_batch::Error> {
    let mut column = match source {
        TypedColumn::F32Vec(source) if source.dim() > 0 => TypedColumn::F32Vec(
            shrike_batch::F32VecColumn::with_dim(rows.len(), source.dim()),
        ),
        other => TypedColumn::new(other.column_type(), rows.len()),
    };
    for (target, &origin) in rows.iter().enumerate() {
        if !source.is_null(origin) {
            let value = source.value(origin)?;
            column.set_value(target, &value)?;
        }
    }
    Ok(column)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use shrike_batch::{F32Column, I64Column};
    use shrike_core::{KeyRegistry, Value};

    use super::*;

    fn batch(ids: &[i64], base: &[f32]) -> ColumnBatch {
        let mut id_column = I64Column::with_len(ids.len());
        for (row, &id) in ids.iter().enumerate() {
            id_column.set(row, id);
        }
        let mut batch = ColumnBatch::with_row_count(ids.len());
        batch
            .set_column(
                keys::id::CAND_CANDIDATE_ID,
                Arc::new(TypedColumn::I64(id_column)),
            )
            .unwrap();
        batch
            .set_column(
                keys::id::SCORE_BASE,
                Arc::new(TypedColumn::F32(F32Column::from_values(base.to_vec()))),
            )
            .unwrap();
        batch
    }

    #[test]
    fn test_merge_first_keeps_earliest() {
        let registry = KeyRegistry::from_builtin();
        let ctx = ExecContext::new(&registry);
        let input = batch(&[1, 2, 1], &[0.9, 0.8, 0.95]);
        let output = Merge
            .run(&ctx, &input, &serde_json::json!({"dedup": "first"}))
            .unwrap();
        assert_eq!(output.row_count(), 2);
        // Kept rows 0 and 1, in input order.
        assert_eq!(output.value(0, keys::id::CAND_CANDIDATE_ID), Value::I64(1));
        assert_eq!(output.value(0, keys::id::SCORE_BASE), Value::F32(0.9));
        assert_eq!(output.value(1, keys::id::CAND_CANDIDATE_ID), Value::I64(2));
    }

    #[test]
    fn test_merge_max_base_keeps_best() {
        let registry = KeyRegistry::from_builtin();
        let ctx = ExecContext::new(&registry);
        let input = batch(&[1, 2, 1], &[0.9, 0.8, 0.95]);
        let output = Merge
            .run(&ctx, &input, &serde_json::json!({"dedup": "max_base"}))
            .unwrap();
        assert_eq!(output.row_count(), 2);
        // Row 2 beats row 0 for id 1; kept rows are [1, 2] sorted.
        assert_eq!(output.value(0, keys::id::CAND_CANDIDATE_ID), Value::I64(2));
        assert_eq!(output.value(1, keys::id::CAND_CANDIDATE_ID), Value::I64(1));
        assert_eq!(output.value(1, keys::id::SCORE_BASE), Value::F32(0.95));
    }

    #[test]
    fn test_merge_skips_missing_ids() {
        let registry = KeyRegistry::from_builtin();
        let ctx = ExecContext::new(&registry);
        let mut input = batch(&[1, 7], &[0.9, 0.8]);
        // Null out the second id.
        let mut ids = I64Column::with_len(2);
        ids.set(0, 1);
        input
            .set_column(keys::id::CAND_CANDIDATE_ID, Arc::new(TypedColumn::I64(ids)))
            .unwrap();

        let output = Merge
            .run(&ctx, &input, &serde_json::json!({}))
            .unwrap();
        assert_eq!(output.row_count(), 1);
        assert_eq!(output.value(0, keys::id::CAND_CANDIDATE_ID), Value::I64(1));
    }

    #[test]
    fn test_merge_invalid_dedup() {
        let registry = KeyRegistry::from_builtin();
        let ctx = ExecContext::new(&registry);
        let input = batch(&[1], &[0.9]);
        let err = Merge
            .run(&ctx, &input, &serde_json::json!({"dedup": "last"}))
            .unwrap_err();
        assert!(matches!(err.current_context(), Error::InvalidParam { .. }));
    }

    #[test]
    fn test_merge_empty_input() {
        let registry = KeyRegistry::from_builtin();
        let ctx = ExecContext::new(&registry);
        let output = Merge
            .run(&ctx, &ColumnBatch::empty(), &serde_json::json!({}))
            .unwrap();
        assert_eq!(output.row_count(), 0);
    }
}
