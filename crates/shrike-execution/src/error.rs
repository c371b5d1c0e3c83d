#[derive(derive_more::Display, Debug)]
pub enum Error {
    #[display(fmt = "unknown op '{op}' on node '{node}'")]
    UnknownOp { node: String, op: String },
    #[display(fmt = "node '{node}' (op '{op}') failed")]
    NodeFailed { node: String, op: String },
    #[display(fmt = "failed to assemble input batch for node '{node}'")]
    AssembleInput { node: String },
    #[display(fmt = "internal error: {_0}")]
    Internal(String),
}

impl error_stack::Context for Error {}
