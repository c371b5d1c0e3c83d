use shrike_core::KeyType;

#[derive(derive_more::Display, Debug, Clone, PartialEq)]
pub enum Error {
    #[display(fmt = "guest module not found: {_0}")]
    MissingModule(String),
    #[display(fmt = "failed to load guest module '{_0}'")]
    ModuleLoad(String),
    #[display(fmt = "invalid module meta: {_0}")]
    MetaInvalid(String),
    #[display(fmt = "write to key {_0} not declared in meta.writes")]
    WriteNotDeclared(i32),
    #[display(fmt = "type mismatch for key {key_id}: declared {declared}, requested {requested}")]
    TypeMismatch {
        key_id: i32,
        declared: KeyType,
        requested: KeyType,
    },
    #[display(fmt = "key {_0} is not declared in the registry")]
    UnknownKey(i32),
    #[display(fmt = "write budget exceeded: {what} (limit {limit})")]
    BudgetExceeded { what: &'static str, limit: i64 },
    #[display(fmt = "guest execution exceeded the instruction limit")]
    InstructionLimit,
    #[display(fmt = "IO capability not enabled for this module")]
    IoNotEnabled,
    #[display(fmt = "IO budget exceeded: {what} (limit {limit})")]
    IoBudgetExceeded { what: &'static str, limit: i64 },
    #[display(fmt = "invalid CSV resource path '{resource}': {reason}")]
    PathTraversal {
        resource: String,
        reason: &'static str,
    },
    #[display(fmt = "failed to read CSV resource '{_0}'")]
    CsvRead(String),
    #[display(fmt = "guest runtime error: {_0}")]
    Guest(String),
}

impl error_stack::Context for Error {}
