use shrike_core::ValueType;

#[derive(derive_more::Display, Debug)]
pub enum Error {
    #[display(fmt = "type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: ValueType,
        actual: ValueType,
    },
    #[display(fmt = "dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[display(fmt = "row index {index} out of bounds (len {len})")]
    OutOfBounds { index: usize, len: usize },
    #[display(fmt = "column length {actual} does not match batch row count {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[display(fmt = "key {_0} is not declared in the registry")]
    UnknownKey(i32),
    #[display(fmt = "internal error: {_0}")]
    Internal(String),
}

impl error_stack::Context for Error {}
