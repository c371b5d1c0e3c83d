use itertools::Itertools;

use crate::Error;

/// Expression IR over batch columns.
///
/// Trees are immutable after construction and fully owned by their holder.
/// Non-leaf kinds own their children in boxed form.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A literal.
    Const(f32),
    /// The f32 coercion of a column cell at the current row.
    Signal(i32),
    /// Sum of the arguments; empty sums to 0.
    Add(Vec<Expr>),
    /// Product of the arguments; empty multiplies to 1.
    Mul(Vec<Expr>),
    /// Minimum of the arguments; empty is 0.
    Min(Vec<Expr>),
    /// Maximum of the arguments; empty is 0.
    Max(Vec<Expr>),
    /// Cosine similarity of two f32vec signals.
    Cos(Box<Expr>, Box<Expr>),
    /// Clamp `x` into `[lo, hi]`.
    Clamp {
        x: Box<Expr>,
        lo: Box<Expr>,
        hi: Box<Expr>,
    },
    /// The value of the registry key named `"penalty." + name`.
    Penalty(String),
}

/// Parse an expression from its JSON wire form.
///
/// Shapes: `{"op": "const", "value": v}`, `{"op": "signal", "key_id": k}`,
/// `{"op": "add" | "mul" | "min" | "max", "args": [...]}`,
/// `{"op": "cos", "a": ..., "b": ...}`,
/// `{"op": "clamp", "x": ..., "lo": ..., "hi": ...}`,
/// `{"op": "penalty", "name": s}`.
pub fn parse(json: &serde_json::Value) -> error_stack::Result<Expr, Error> {
    let object = json.as_object().ok_or_else(|| {
        error_stack::Report::new(Error::NotAnObject)
    })?;
    let op = object
        .get("op")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| {
            error_stack::Report::new(Error::MissingField {
                op: "<node>",
                field: "op",
            })
        })?;

    match op {
        "const" => {
            let value = object
                .get("value")
                .and_then(serde_json::Value::as_f64)
                .ok_or_else(|| missing("const", "value"))?;
            Ok(Expr::Const(value as f32))
        }
        "signal" => {
            let key_id = object
                .get("key_id")
                .and_then(serde_json::Value::as_i64)
                .ok_or_else(|| missing("signal", "key_id"))?;
            Ok(Expr::Signal(key_id as i32))
        }
        "add" => Ok(Expr::Add(parse_args(object, "add")?)),
        "mul" => Ok(Expr::Mul(parse_args(object, "mul")?)),
        "min" => Ok(Expr::Min(parse_args(object, "min")?)),
        "max" => Ok(Expr::Max(parse_args(object, "max")?)),
        "cos" => {
            let a = parse(object.get("a").ok_or_else(|| missing("cos", "a"))?)?;
            let b = parse(object.get("b").ok_or_else(|| missing("cos", "b"))?)?;
            Ok(Expr::Cos(Box::new(a), Box::new(b)))
        }
        "clamp" => {
            let x = parse(object.get("x").ok_or_else(|| missing("clamp", "x"))?)?;
            let lo = parse(object.get("lo").ok_or_else(|| missing("clamp", "lo"))?)?;
            let hi = parse(object.get("hi").ok_or_else(|| missing("clamp", "hi"))?)?;
            Ok(Expr::Clamp {
                x: Box::new(x),
                lo: Box::new(lo),
                hi: Box::new(hi),
            })
        }
        "penalty" => {
            let name = object
                .get("name")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| missing("penalty", "name"))?;
            Ok(Expr::Penalty(name.to_owned()))
        }
        other => error_stack::bail!(Error::UnknownOp(other.to_owned())),
    }
}

fn parse_args(
    object: &serde_json::Map<String, serde_json::Value>,
    op: &'static str,
) -> error_stack::Result<Vec<Expr>, Error> {
    let args = object
        .get("args")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| missing(op, "args"))?;
    args.iter().map(parse).collect()
}

fn missing(op: &'static str, field: &'static str) -> error_stack::Report<Error> {
    error_stack::Report::new(Error::MissingField { op, field })
}

/// Every key id referenced transitively by `Signal` leaves.
///
/// Drives read-set inference. `Penalty` keys are resolved by name through
/// the registry at evaluation time and do not contribute.
pub fn collect_key_ids(expr: &Expr) -> Vec<i32> {
    let mut ids = Vec::new();
    collect_into(expr, &mut ids);
    ids.into_iter().unique().sorted().collect()
}

fn collect_into(expr: &Expr, ids: &mut Vec<i32>) {
    match expr {
        Expr::Const(_) | Expr::Penalty(_) => {}
        Expr::Signal(key_id) => ids.push(*key_id),
        Expr::Add(args) | Expr::Mul(args) | Expr::Min(args) | Expr::Max(args) => {
            for arg in args {
                collect_into(arg, ids);
            }
        }
        Expr::Cos(a, b) => {
            collect_into(a, ids);
            collect_into(b, ids);
        }
        Expr::Clamp { x, lo, hi } => {
            collect_into(x, ids);
            collect_into(lo, ids);
            collect_into(hi, ids);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested() {
        let json: serde_json::Value = serde_json::from_str(
            r#"{"op": "mul", "args": [
                {"op": "const", "value": 2.0},
                {"op": "signal", "key_id": 3001}
            ]}"#,
        )
        .unwrap();
        let expr = parse(&json).unwrap();
        assert_eq!(
            expr,
            Expr::Mul(vec![Expr::Const(2.0), Expr::Signal(3001)])
        );
    }

    #[test]
    fn test_parse_unknown_op() {
        let json = serde_json::json!({"op": "pow", "args": []});
        let err = parse(&json).unwrap_err();
        assert!(matches!(err.current_context(), Error::UnknownOp(_)));
    }

    #[test]
    fn test_parse_missing_field() {
        let json = serde_json::json!({"op": "signal"});
        let err = parse(&json).unwrap_err();
        assert!(matches!(err.current_context(), Error::MissingField { .. }));
    }

    #[test]
    fn test_collect_key_ids() {
        let expr = Expr::Add(vec![
            Expr::Signal(3001),
            Expr::Cos(Box::new(Expr::Signal(2002)), Box::new(Expr::Signal(2003))),
            Expr::Signal(3001),
            Expr::Penalty("diversity".to_owned()),
        ]);
        assert_eq!(collect_key_ids(&expr), vec![2002, 2003, 3001]);
    }
}
