#[derive(derive_more::Display, Debug)]
pub enum Error {
    #[display(fmt = "failed to read plan file '{_0}'")]
    ReadPlan(String),
    #[display(fmt = "invalid plan JSON")]
    JsonParse,
    #[display(fmt = "duplicate node id '{_0}'")]
    DuplicateNodeId(String),
    #[display(fmt = "plan contains a cycle")]
    GraphCycle,
    #[display(fmt = "unknown op '{op}' on node '{node}'")]
    UnknownOp { node: String, op: String },
    #[display(
        fmt = "experimental op '{op}' (namespace {namespace}) on node '{node}' is not allowed in prod plans"
    )]
    ExperimentalInProd {
        node: String,
        op: String,
        namespace: String,
    },
    #[display(fmt = "invalid trace_key on node '{node}': {reason}")]
    InvalidTraceKey { node: String, reason: String },
    #[display(fmt = "{_0}")]
    PlanTooComplex(String),
    #[display(fmt = "failed to read complexity budget file '{_0}'")]
    ReadBudget(String),
    #[display(fmt = "invalid complexity budget JSON")]
    BudgetParse,
}

impl error_stack::Context for Error {}
