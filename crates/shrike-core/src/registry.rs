use std::path::Path;
use std::str::FromStr;

use error_stack::{IntoReport, ResultExt};
use hashbrown::HashMap;

use crate::{keys, Error, Key, KeyType};

/// The process-wide table of declared keys.
///
/// Populated once at startup -- either from the compiled-in table or from a
/// `keys.json` file -- and immutable afterwards. Ids and names are unique,
/// and the declared type for a given id never changes.
#[derive(Clone, Debug, Default)]
pub struct KeyRegistry {
    version: i32,
    keys: Vec<Key>,
    by_id: HashMap<i32, usize>,
    by_name: HashMap<String, usize>,
}

/// On-disk registry shape: `{version, keys: [{id, name, type, ...}]}`.
#[derive(serde::Deserialize)]
struct RegistryFile {
    #[serde(default)]
    version: i32,
    keys: Vec<RawKey>,
}

#[derive(serde::Deserialize)]
struct RawKey {
    id: i32,
    name: String,
    #[serde(rename = "type")]
    type_str: String,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    doc: Option<String>,
}

impl KeyRegistry {
    /// Build the registry from the compiled-in key table.
    pub fn from_builtin() -> Self {
        let mut registry = Self::default();
        for &(id, name, key_type) in keys::ALL_KEYS {
            // The builtin table is unique by construction.
            registry
                .insert(Key::new(id, name, key_type))
                .expect("builtin key table is unique");
        }
        registry
    }

    /// Load a registry from a `keys.json` file.
    pub fn from_json_file(path: impl AsRef<Path>) -> error_stack::Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .into_report()
            .change_context_lazy(|| Error::ReadRegistry(path.display().to_string()))?;
        Self::from_json_str(&contents)
    }

    /// Load a registry from a JSON string.
    pub fn from_json_str(json: &str) -> error_stack::Result<Self, Error> {
        let file: RegistryFile = serde_json::from_str(json)
            .into_report()
            .change_context(Error::JsonParse)?;

        let mut registry = Self {
            version: file.version,
            ..Self::default()
        };
        for raw in file.keys {
            let key_type =
                KeyType::from_str(&raw.type_str).map_err(|_| Error::UnknownKeyType {
                    name: raw.name.clone(),
                    type_str: raw.type_str.clone(),
                })?;
            registry.insert(Key {
                id: raw.id,
                name: raw.name,
                key_type,
                scope: raw.scope,
                owner: raw.owner,
                doc: raw.doc,
            })?;
        }
        Ok(registry)
    }

    fn insert(&mut self, key: Key) -> error_stack::Result<(), Error> {
        error_stack::ensure!(
            !self.by_id.contains_key(&key.id),
            Error::DuplicateKey {
                what: "id",
                value: key.id.to_string(),
            }
        );
        error_stack::ensure!(
            !self.by_name.contains_key(&key.name),
            Error::DuplicateKey {
                what: "name",
                value: key.name.clone(),
            }
        );
        let index = self.keys.len();
        self.by_id.insert(key.id, index);
        self.by_name.insert(key.name.clone(), index);
        self.keys.push(key);
        Ok(())
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// Look up a key by id.
    pub fn key(&self, id: i32) -> Option<&Key> {
        self.by_id.get(&id).map(|&index| &self.keys[index])
    }

    /// Look up a key by name.
    pub fn key_by_name(&self, name: &str) -> Option<&Key> {
        self.by_name.get(name).map(|&index| &self.keys[index])
    }

    /// All registered keys, in declaration order.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }
}
