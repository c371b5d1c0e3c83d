/// Stability of an operator, gating its use in `prod` plans.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display, strum_macros::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Stability {
    Stable,
    Experimental,
}

/// How the executor assembles the input batch for an operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    /// The single predecessor's output (or an empty batch for sources).
    Single,
    /// Row-wise concatenation of every predecessor's output.
    Concat,
}

/// Which keys an operator produces.
#[derive(Clone, Copy, Debug)]
pub enum WritesDescriptor {
    /// A fixed set of key ids.
    Static(&'static [i32]),
    /// Derived from a param that names a key id or list of key ids.
    ParamDerived { param_name: &'static str },
}

/// Static metadata describing a registered operator.
///
/// The params schema is carried as JSON text so specs stay const-constructible
/// for inventory submission; it is parsed on export.
#[derive(Clone, Copy, Debug)]
pub struct NodeSpec {
    pub op: &'static str,
    pub namespace_path: &'static str,
    pub stability: Stability,
    pub doc: &'static str,
    pub input_mode: InputMode,
    pub params_schema: &'static str,
    pub reads: &'static [i32],
    pub writes: WritesDescriptor,
}
