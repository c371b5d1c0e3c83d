use error_stack::ResultExt;
use shrike_batch::{BatchBuilder, ColumnBatch, F32Column, I64Column, TypedColumn};
use shrike_core::keys;

use crate::params::{int_or, str_or};
use crate::{
    Error, ExecContext, InputMode, NodeSpec, Operator, OperatorFactory, Stability,
    WritesDescriptor,
};

inventory::submit!(OperatorFactory {
    spec: NodeSpec {
        op: "core:sourcer",
        namespace_path: "core.sourcer",
        stability: Stability::Stable,
        doc: "Generates k candidate rows with ids and base retrieval scores.",
        input_mode: InputMode::Single,
        params_schema: r#"{
            "type": "object",
            "properties": {
                "k": {"type": "integer", "minimum": 0},
                "name": {"type": "string"}
            }
        }"#,
        reads: &[],
        writes: WritesDescriptor::Static(&[keys::id::CAND_CANDIDATE_ID, keys::id::SCORE_BASE]),
    },
    create: &|| Box::new(Sourcer),
});

/// `core:sourcer` -- produces a batch of `k` candidates.
///
/// Candidate ids run 1..=k; base scores decrease linearly from 1 so rank
/// order is observable downstream.
pub struct Sourcer;

impl Operator for Sourcer {
    fn run(
        &self,
        ctx: &ExecContext<'_>,
        _input: &ColumnBatch,
        params: &serde_json::Value,
    ) -> error_stack::Result<ColumnBatch, Error> {
        let k = int_or(params, "k", 100).max(0) as usize;
        let name = str_or(params, "name", "default");
        tracing::debug!(sourcer = name, k, "sourcing candidates");

        let mut ids = I64Column::with_len(k);
        let mut base = F32Column::with_len(k);
        for row in 0..k {
            ids.set(row, (row + 1) as i64);
            base.set(row, 1.0 - row as f32 / k as f32);
        }

        let mut builder = BatchBuilder::new(k).with_registry(ctx.registry);
        builder
            .add_column(keys::id::CAND_CANDIDATE_ID, TypedColumn::I64(ids))
            .change_context(Error::Batch)?;
        builder
            .add_column(keys::id::SCORE_BASE, TypedColumn::F32(base))
            .change_context(Error::Batch)?;
        Ok(builder.build())
    }
}
