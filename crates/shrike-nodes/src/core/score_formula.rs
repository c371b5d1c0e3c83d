use error_stack::ResultExt;
use shrike_batch::{BatchBuilder, ColumnBatch, F32Column, TypedColumn};
use shrike_core::keys;
use shrike_expr::Expr;

use crate::params::int_or;
use crate::{
    Error, ExecContext, InputMode, NodeSpec, Operator, OperatorFactory, Stability,
    WritesDescriptor,
};

inventory::submit!(OperatorFactory {
    spec: NodeSpec {
        op: "core:score_formula",
        namespace_path: "core.score_formula",
        stability: Stability::Stable,
        doc: "Evaluates a score expression per row into an output key.",
        input_mode: InputMode::Single,
        params_schema: r#"{
            "type": "object",
            "properties": {
                "expr": {"type": "object"},
                "output_key_id": {"type": "integer"}
            }
        }"#,
        reads: &[],
        writes: WritesDescriptor::ParamDerived { param_name: "output_key_id" },
    },
    create: &|| Box::new(ScoreFormula),
});

/// `core:score_formula` -- evaluates an expression-IR tree per row.
///
/// With no `expr` param the base score passes through unchanged. The read
/// set is whatever the expression references (`shrike_expr::collect_key_ids`).
pub struct ScoreFormula;

impl Operator for ScoreFormula {
    fn run(
        &self,
        ctx: &ExecContext<'_>,
        input: &ColumnBatch,
        params: &serde_json::Value,
    ) -> error_stack::Result<ColumnBatch, Error> {
        let output_key = int_or(params, "output_key_id", keys::id::SCORE_FINAL as i64) as i32;
        match ctx.registry.key(output_key) {
            Some(key) if key.key_type == shrike_core::KeyType::F32 => {}
            Some(key) => error_stack::bail!(Error::InvalidParam {
                op: "core:score_formula",
                param: "output_key_id",
                reason: format!("key '{}' is declared {}, not f32", key.name, key.key_type),
            }),
            None => error_stack::bail!(Error::InvalidParam {
                op: "core:score_formula",
                param: "output_key_id",
                reason: format!("key {output_key} is not in the registry"),
            }),
        }
        let expr = match params.get("expr") {
            Some(json) => shrike_expr::parse(json).change_context(Error::Expr)?,
            None => Expr::Signal(keys::id::SCORE_BASE),
        };

        let rows = input.row_count();
        let mut scores = F32Column::with_len(rows);
        for row in 0..rows {
            scores.set(row, shrike_expr::eval(&expr, input, row, Some(ctx.registry)));
        }

        let mut builder = BatchBuilder::from_source(input).with_registry(ctx.registry);
        builder
            .add_column(output_key, TypedColumn::F32(scores))
            .change_context(Error::Batch)?;
        Ok(builder.build())
    }
}
