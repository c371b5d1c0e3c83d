#[derive(derive_more::Display, Debug)]
pub enum Error {
    #[display(fmt = "failed to read key registry file '{_0}'")]
    ReadRegistry(String),
    #[display(fmt = "invalid key registry JSON")]
    JsonParse,
    #[display(fmt = "unknown key type '{type_str}' for key '{name}'")]
    UnknownKeyType { name: String, type_str: String },
    #[display(fmt = "duplicate key {what} '{value}'")]
    DuplicateKey {
        what: &'static str,
        value: String,
    },
}

impl error_stack::Context for Error {}
