use crate::{Value, ValueType};

/// The declared type of a key -- every [`ValueType`] except `Null`.
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
pub enum KeyType {
    Bool,
    I64,
    F32,
    String,
    Bytes,
    F32Vec,
}

impl KeyType {
    pub fn value_type(self) -> ValueType {
        match self {
            KeyType::Bool => ValueType::Bool,
            KeyType::I64 => ValueType::I64,
            KeyType::F32 => ValueType::F32,
            KeyType::String => ValueType::String,
            KeyType::Bytes => ValueType::Bytes,
            KeyType::F32Vec => ValueType::F32Vec,
        }
    }

    /// Whether `value` may be stored in a cell of this type.
    ///
    /// Null is always accepted -- it clears the cell rather than typing it.
    pub fn accepts(self, value: &Value) -> bool {
        value.is_null() || value.value_type() == self.value_type()
    }
}

/// A registry-declared key: a stable id, a textual name, and a declared type.
#[derive(Clone, Debug, PartialEq)]
pub struct Key {
    pub id: i32,
    pub name: String,
    pub key_type: KeyType,
    pub scope: Option<String>,
    pub owner: Option<String>,
    pub doc: Option<String>,
}

impl Key {
    pub fn new(id: i32, name: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            id,
            name: name.into(),
            key_type,
            scope: None,
            owner: None,
            doc: None,
        }
    }
}
