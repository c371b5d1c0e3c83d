use shrike_batch::{ColumnBatch, TypedColumn};
use shrike_core::KeyRegistry;

use crate::Expr;

/// Evaluate an expression for one row of a batch.
///
/// Expressions are total: missing columns, nulls, and non-numeric cells all
/// read as 0.0, so evaluation never fails.
pub fn eval(
    expr: &Expr,
    batch: &ColumnBatch,
    row: usize,
    registry: Option<&KeyRegistry>,
) -> f32 {
    match expr {
        Expr::Const(value) => *value,
        Expr::Signal(key_id) => signal(batch, row, *key_id),
        Expr::Add(args) => args.iter().map(|arg| eval(arg, batch, row, registry)).sum(),
        Expr::Mul(args) => args
            .iter()
            .map(|arg| eval(arg, batch, row, registry))
            .product(),
        Expr::Min(args) => fold_extremum(args, batch, row, registry, f32::min),
        Expr::Max(args) => fold_extremum(args, batch, row, registry, f32::max),
        Expr::Cos(a, b) => match (a.as_ref(), b.as_ref()) {
            (Expr::Signal(a), Expr::Signal(b)) => cos_signal(batch, row, *a, *b),
            _ => 0.0,
        },
        Expr::Clamp { x, lo, hi } => {
            let x = eval(x, batch, row, registry);
            let mut lo = eval(lo, batch, row, registry);
            let mut hi = eval(hi, batch, row, registry);
            // Mirror swapped bounds rather than leaving clamp undefined.
            if lo > hi {
                std::mem::swap(&mut lo, &mut hi);
            }
            x.clamp(lo, hi)
        }
        Expr::Penalty(name) => registry
            .and_then(|registry| registry.key_by_name(&format!("penalty.{name}")))
            .map(|key| signal(batch, row, key.id))
            .unwrap_or(0.0),
    }
}

fn fold_extremum(
    args: &[Expr],
    batch: &ColumnBatch,
    row: usize,
    registry: Option<&KeyRegistry>,
    pick: fn(f32, f32) -> f32,
) -> f32 {
    args.iter()
        .map(|arg| eval(arg, batch, row, registry))
        .reduce(pick)
        .unwrap_or(0.0)
}

/// The f32 coercion of a cell: f32 as-is, i64 widened, everything else 0.0.
fn signal(batch: &ColumnBatch, row: usize, key_id: i32) -> f32 {
    if row >= batch.row_count() {
        return 0.0;
    }
    let Some(handle) = batch.column(key_id) else {
        return 0.0;
    };
    match handle.as_ref() {
        TypedColumn::F32(column) if !column.is_null(row) => column.get(row),
        TypedColumn::I64(column) if !column.is_null(row) => column.get(row) as f32,
        _ => 0.0,
    }
}

fn cos_signal(batch: &ColumnBatch, row: usize, a: i32, b: i32) -> f32 {
    if row >= batch.row_count() {
        return 0.0;
    }
    let (Some(a), Some(b)) = (batch.f32vec_column(a), batch.f32vec_column(b)) else {
        return 0.0;
    };
    if a.is_null(row) || b.is_null(row) {
        return 0.0;
    }
    cosine_similarity(a.row(row), b.row(row))
}

/// Cosine similarity, clamped to `[-1, 1]` against numeric drift.
///
/// Empty, differing-length, and zero-norm inputs all compare as 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use shrike_batch::{F32Column, F32VecColumn, I64Column};
    use shrike_core::keys;

    use super::*;

    fn test_batch() -> ColumnBatch {
        let mut batch = ColumnBatch::with_row_count(2);
        batch
            .set_column(
                keys::id::SCORE_BASE,
                Arc::new(TypedColumn::F32(F32Column::from_values(vec![0.5, 0.25]))),
            )
            .unwrap();
        let mut ids = I64Column::with_len(2);
        ids.set(0, 10);
        ids.set(1, 20);
        batch
            .set_column(keys::id::CAND_CANDIDATE_ID, Arc::new(TypedColumn::I64(ids)))
            .unwrap();

        let mut embedding = F32VecColumn::with_dim(2, 3);
        embedding.set_row(0, &[1.0, 0.0, 0.0]).unwrap();
        embedding.set_row(1, &[0.0, 1.0, 0.0]).unwrap();
        let mut query = F32VecColumn::with_dim(2, 3);
        query.set_row(0, &[1.0, 0.0, 0.0]).unwrap();
        query.set_row(1, &[1.0, 0.0, 0.0]).unwrap();
        batch
            .set_column(
                keys::id::FEAT_EMBEDDING,
                Arc::new(TypedColumn::F32Vec(embedding)),
            )
            .unwrap();
        batch
            .set_column(
                keys::id::FEAT_QUERY_EMBEDDING,
                Arc::new(TypedColumn::F32Vec(query)),
            )
            .unwrap();
        batch
    }

    #[test]
    fn test_arithmetic() {
        let batch = test_batch();
        let expr = Expr::Add(vec![
            Expr::Const(1.0),
            Expr::Mul(vec![Expr::Const(2.0), Expr::Signal(keys::id::SCORE_BASE)]),
        ]);
        assert_eq!(eval(&expr, &batch, 0, None), 2.0);
        assert_eq!(eval(&expr, &batch, 1, None), 1.5);
    }

    #[test]
    fn test_empty_add_and_mul() {
        let batch = test_batch();
        assert_eq!(eval(&Expr::Add(vec![]), &batch, 0, None), 0.0);
        assert_eq!(eval(&Expr::Mul(vec![]), &batch, 0, None), 1.0);
        assert_eq!(eval(&Expr::Min(vec![]), &batch, 0, None), 0.0);
        assert_eq!(eval(&Expr::Max(vec![]), &batch, 0, None), 0.0);
    }

    #[test]
    fn test_signal_widens_i64() {
        let batch = test_batch();
        assert_eq!(
            eval(&Expr::Signal(keys::id::CAND_CANDIDATE_ID), &batch, 1, None),
            20.0
        );
    }

    #[test]
    fn test_signal_missing_column_is_zero() {
        let batch = test_batch();
        assert_eq!(eval(&Expr::Signal(4242), &batch, 0, None), 0.0);
    }

    #[test]
    fn test_min_max() {
        let batch = test_batch();
        let args = vec![Expr::Const(3.0), Expr::Const(-1.0), Expr::Const(2.0)];
        assert_eq!(eval(&Expr::Min(args.clone()), &batch, 0, None), -1.0);
        assert_eq!(eval(&Expr::Max(args), &batch, 0, None), 3.0);
    }

    #[test]
    fn test_cos_of_signals() {
        let batch = test_batch();
        let expr = Expr::Cos(
            Box::new(Expr::Signal(keys::id::FEAT_EMBEDDING)),
            Box::new(Expr::Signal(keys::id::FEAT_QUERY_EMBEDDING)),
        );
        // Row 0: identical unit vectors; row 1: orthogonal.
        assert!((eval(&expr, &batch, 0, None) - 1.0).abs() < 1e-6);
        assert!(eval(&expr, &batch, 1, None).abs() < 1e-6);
    }

    #[test]
    fn test_cos_requires_signal_operands() {
        let batch = test_batch();
        let expr = Expr::Cos(Box::new(Expr::Const(1.0)), Box::new(Expr::Const(1.0)));
        assert_eq!(eval(&expr, &batch, 0, None), 0.0);
    }

    #[test]
    fn test_cosine_similarity_properties() {
        let unit = [0.6f32, 0.8, 0.0];
        let negated = [-0.6f32, -0.8, 0.0];
        let orthogonal = [0.0f32, 0.0, 1.0];
        assert!((cosine_similarity(&unit, &unit) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&unit, &negated) + 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&unit, &orthogonal).abs() < 1e-6);
        assert_eq!(cosine_similarity(&unit, &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&unit, &[0.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_clamp_mirrors_swapped_bounds() {
        let batch = test_batch();
        let expr = Expr::Clamp {
            x: Box::new(Expr::Const(5.0)),
            lo: Box::new(Expr::Const(1.0)),
            hi: Box::new(Expr::Const(0.0)),
        };
        assert_eq!(eval(&expr, &batch, 0, None), 1.0);
    }

    #[test]
    fn test_penalty_reads_registry_key() {
        let registry = KeyRegistry::from_builtin();
        let mut batch = test_batch();
        batch
            .set_column(
                keys::id::PENALTY_DIVERSITY,
                Arc::new(TypedColumn::F32(F32Column::from_values(vec![0.3, 0.6]))),
            )
            .unwrap();
        let expr = Expr::Penalty("diversity".to_owned());
        assert_eq!(eval(&expr, &batch, 1, Some(&registry)), 0.6);
        // Unknown penalty name reads as zero.
        let expr = Expr::Penalty("nonexistent".to_owned());
        assert_eq!(eval(&expr, &batch, 0, Some(&registry)), 0.0);
        // Without a registry, penalties read as zero.
        let expr = Expr::Penalty("diversity".to_owned());
        assert_eq!(eval(&expr, &batch, 0, None), 0.0);
    }
}
