use std::path::{Path, PathBuf};

use error_stack::{IntoReport, ResultExt};

use crate::Error;

/// Engine policy for guest-module capabilities.
///
/// Modules not listed here are denied every capability. An entry with no
/// version matches any version of the named module.
#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct ModulePolicy {
    /// Directory CSV resources are resolved under.
    #[serde(default)]
    csv_assets_dir: PathBuf,
    #[serde(default)]
    modules: Vec<PolicyEntry>,
}

#[derive(Clone, Debug, serde::Deserialize)]
struct PolicyEntry {
    name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    allow_io_csv_read: bool,
}

impl ModulePolicy {
    pub fn from_json_file(path: impl AsRef<Path>) -> error_stack::Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .into_report()
            .change_context_lazy(|| Error::ReadPolicy(path.display().to_string()))?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(json: &str) -> error_stack::Result<Self, Error> {
        serde_json::from_str(json)
            .into_report()
            .change_context(Error::PolicyParse)
    }

    pub fn csv_assets_dir(&self) -> &Path {
        &self.csv_assets_dir
    }

    /// Whether `(name, version)` may read CSV assets. Default deny.
    pub fn allows_csv_read(&self, name: &str, version: &str) -> bool {
        self.modules.iter().any(|entry| {
            entry.name == name
                && entry
                    .version
                    .as_deref()
                    .map(|required| required == version)
                    .unwrap_or(true)
                && entry.allow_io_csv_read
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_deny() {
        let policy = ModulePolicy::default();
        assert!(!policy.allows_csv_read("anything", "1.0"));
    }

    #[test]
    fn test_policy_parse_and_match() {
        let policy = ModulePolicy::from_json_str(
            r#"{
              "csv_assets_dir": "/var/shrike/csv",
              "modules": [
                {"name": "boost_fresh", "allow_io_csv_read": true},
                {"name": "pinned", "version": "2.0", "allow_io_csv_read": true},
                {"name": "denied", "allow_io_csv_read": false}
              ]
            }"#,
        )
        .unwrap();
        assert!(policy.allows_csv_read("boost_fresh", "any-version"));
        assert!(policy.allows_csv_read("pinned", "2.0"));
        assert!(!policy.allows_csv_read("pinned", "2.1"));
        assert!(!policy.allows_csv_read("denied", "1.0"));
        assert!(!policy.allows_csv_read("unlisted", "1.0"));
        assert_eq!(policy.csv_assets_dir(), Path::new("/var/shrike/csv"));
    }

    #[test]
    fn test_policy_bad_json() {
        let err = ModulePolicy::from_json_str("{not json").unwrap_err();
        assert!(matches!(err.current_context(), Error::PolicyParse));
    }
}
