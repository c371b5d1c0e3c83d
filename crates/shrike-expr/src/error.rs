#[derive(derive_more::Display, Debug)]
pub enum Error {
    #[display(fmt = "unknown expression op '{_0}'")]
    UnknownOp(String),
    #[display(fmt = "expression node missing field '{field}' for op '{op}'")]
    MissingField {
        op: &'static str,
        field: &'static str,
    },
    #[display(fmt = "expression node has invalid field '{field}' for op '{op}'")]
    InvalidField {
        op: &'static str,
        field: &'static str,
    },
    #[display(fmt = "expression is not a JSON object")]
    NotAnObject,
}

impl error_stack::Context for Error {}
