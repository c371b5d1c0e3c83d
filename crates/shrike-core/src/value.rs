/// A runtime value.
///
/// This is the closed set of cell types the engine understands. Values are
/// plain data -- comparisons are structural, and `F32Vec` rows within a
/// column share a single dimension enforced at the column level.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I64(i64),
    F32(f32),
    String(String),
    Bytes(Vec<u8>),
    F32Vec(Vec<f32>),
}

/// The type tag of a [`Value`].
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum ValueType {
    Null,
    Bool,
    I64,
    F32,
    String,
    Bytes,
    F32Vec,
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::I64(_) => ValueType::I64,
            Value::F32(_) => ValueType::F32,
            Value::String(_) => ValueType::String,
            Value::Bytes(_) => ValueType::Bytes,
            Value::F32Vec(_) => ValueType::F32Vec,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::I64(i) => write!(f, "{i}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "bytes[{}]", b.len()),
            Value::F32Vec(v) => write!(f, "f32vec[{}]", v.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_tags() {
        assert_eq!(Value::Null.value_type(), ValueType::Null);
        assert_eq!(Value::I64(3).value_type(), ValueType::I64);
        assert_eq!(Value::F32Vec(vec![0.0; 4]).value_type(), ValueType::F32Vec);
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(Value::F32(1.5), Value::F32(1.5));
        assert_ne!(Value::F32(1.5), Value::I64(1));
        assert_eq!(
            Value::Bytes(vec![1, 2, 3]),
            Value::Bytes(vec![1, 2, 3])
        );
    }

    #[test]
    fn test_type_strings() {
        assert_eq!(ValueType::F32Vec.to_string(), "f32vec");
        assert_eq!("bytes".parse::<ValueType>().unwrap(), ValueType::Bytes);
    }
}
