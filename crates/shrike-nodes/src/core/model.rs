use error_stack::ResultExt;
use shrike_batch::{BatchBuilder, ColumnBatch, F32Column, TypedColumn};
use shrike_core::keys;

use crate::params::str_or;
use crate::{
    Error, ExecContext, InputMode, NodeSpec, Operator, OperatorFactory, Stability,
    WritesDescriptor,
};

inventory::submit!(OperatorFactory {
    spec: NodeSpec {
        op: "core:model",
        namespace_path: "core.model",
        stability: Stability::Stable,
        doc: "Scores candidates with a stub model into score.ml.",
        input_mode: InputMode::Single,
        params_schema: r#"{
            "type": "object",
            "properties": {
                "name": {"type": "string"}
            }
        }"#,
        reads: &[keys::id::SCORE_BASE, keys::id::FEAT_FRESHNESS],
        writes: WritesDescriptor::Static(&[keys::id::SCORE_ML]),
    },
    create: &|| Box::new(Model),
});

/// `core:model` -- writes `score.ml = 0.6 * score.base + 0.4 * feat.freshness`.
pub struct Model;

impl Operator for Model {
    fn run(
        &self,
        ctx: &ExecContext<'_>,
        input: &ColumnBatch,
        params: &serde_json::Value,
    ) -> error_stack::Result<ColumnBatch, Error> {
        let name = str_or(params, "name", "default");
        tracing::debug!(model = name, rows = input.row_count(), "scoring batch");

        let rows = input.row_count();
        let base = input.f32_column(keys::id::SCORE_BASE);
        let freshness = input.f32_column(keys::id::FEAT_FRESHNESS);

        let mut scores = F32Column::with_len(rows);
        for row in 0..rows {
            let base = read_f32(base, row);
            let freshness = read_f32(freshness, row);
            scores.set(row, 0.6 * base + 0.4 * freshness);
        }

        let mut builder = BatchBuilder::from_source(input).with_registry(ctx.registry);
        builder
            .add_column(keys::id::SCORE_ML, TypedColumn::F32(scores))
            .change_context(Error::Batch)?;
        Ok(builder.build())
    }
}

fn read_f32(column: Option<&F32Column>, row: usize) -> f32 {
    column
        .filter(|column| !column.is_null(row))
        .map(|column| column.get(row))
        .unwrap_or(0.0)
}
