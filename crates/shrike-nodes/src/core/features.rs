use error_stack::ResultExt;
use shrike_batch::{BatchBuilder, ColumnBatch, F32Column, F32VecColumn, I64Column, TypedColumn};
use shrike_core::{keys, KeyType};

use crate::params::key_id_list;
use crate::{
    Error, ExecContext, InputMode, NodeSpec, Operator, OperatorFactory, Stability,
    WritesDescriptor,
};

/// Dimension used for stub embedding features.
const EMBEDDING_DIM: usize = 128;

inventory::submit!(OperatorFactory {
    spec: NodeSpec {
        op: "core:features",
        namespace_path: "core.features",
        stability: Stability::Stable,
        doc: "Populates requested feature keys with stub values.",
        input_mode: InputMode::Single,
        params_schema: r#"{
            "type": "object",
            "properties": {
                "keys": {"type": "array", "items": {"type": "integer"}}
            }
        }"#,
        reads: &[keys::id::CAND_CANDIDATE_ID],
        writes: WritesDescriptor::ParamDerived { param_name: "keys" },
    },
    create: &|| Box::new(Features),
});

/// `core:features` -- adds a column per requested key.
///
/// Freshness derives from the candidate id, f32vec keys get a constant
/// embedding, and remaining numeric keys get zero. Columns the operator
/// does not touch are shared with the input.
pub struct Features;

impl Operator for Features {
    fn run(
        &self,
        ctx: &ExecContext<'_>,
        input: &ColumnBatch,
        params: &serde_json::Value,
    ) -> error_stack::Result<ColumnBatch, Error> {
        let requested = key_id_list(params, "core:features", "keys")?;
        let rows = input.row_count();
        let candidate_ids = input.i64_column(keys::id::CAND_CANDIDATE_ID);

        let mut builder = BatchBuilder::from_source(input).with_registry(ctx.registry);
        for key_id in requested {
            let declared = ctx.registry.key(key_id).map(|key| key.key_type);
            let column = match declared {
                _ if key_id == keys::id::FEAT_FRESHNESS => {
                    let mut column = F32Column::with_len(rows);
                    for row in 0..rows {
                        let id = candidate_ids
                            .filter(|ids| !ids.is_null(row))
                            .map(|ids| ids.get(row))
                            .unwrap_or(0);
                        column.set(row, (id % 100) as f32 / 100.0);
                    }
                    TypedColumn::F32(column)
                }
                Some(KeyType::F32Vec) => {
                    let mut column = F32VecColumn::with_dim(rows, EMBEDDING_DIM);
                    column.values_mut().fill(0.1);
                    column.clear_nulls();
                    TypedColumn::F32Vec(column)
                }
                Some(KeyType::I64) => {
                    let mut column = I64Column::with_len(rows);
                    for row in 0..rows {
                        column.set(row, 0);
                    }
                    TypedColumn::I64(column)
                }
                Some(KeyType::Bool) => {
                    let mut column = shrike_batch::BoolColumn::with_len(rows);
                    for row in 0..rows {
                        column.set(row, false);
                    }
                    TypedColumn::Bool(column)
                }
                // No meaningful zero for string/bytes keys; leave them out.
                Some(KeyType::String) | Some(KeyType::Bytes) => continue,
                // F32 keys and unregistered ids get plain zeros.
                Some(KeyType::F32) | None => {
                    let mut column = F32Column::with_len(rows);
                    for row in 0..rows {
                        column.set(row, 0.0);
                    }
                    TypedColumn::F32(column)
                }
            };
            builder.add_column(key_id, column).change_context(Error::Batch)?;
        }
        Ok(builder.build())
    }
}
