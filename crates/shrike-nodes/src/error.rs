#[derive(derive_more::Display, Debug)]
pub enum Error {
    #[display(fmt = "unknown op '{_0}'")]
    UnknownOp(String),
    #[display(fmt = "op '{op}' missing required param '{param}'")]
    MissingParam {
        op: &'static str,
        param: &'static str,
    },
    #[display(fmt = "op '{op}' has invalid param '{param}': {reason}")]
    InvalidParam {
        op: &'static str,
        param: &'static str,
        reason: String,
    },
    #[display(fmt = "failed to build output batch")]
    Batch,
    #[display(fmt = "invalid score expression")]
    Expr,
    #[display(fmt = "guest module failed")]
    GuestModule,
    #[display(fmt = "failed to read module policy file '{_0}'")]
    ReadPolicy(String),
    #[display(fmt = "invalid module policy JSON")]
    PolicyParse,
}

impl error_stack::Context for Error {}
