use std::path::Path;

use error_stack::{IntoReport, ResultExt};

use crate::Error;

/// Maximum length of a node's `trace_key`.
pub const MAX_TRACE_KEY_LEN: usize = 64;

/// The environment a plan is meant to run in. Gates operator stability.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PlanEnv {
    Prod,
    #[default]
    Dev,
    Test,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlanMeta {
    #[serde(default)]
    pub env: PlanEnv,
}

/// One node of the plan DAG.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlanNode {
    pub id: String,
    pub op: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Free-form operator params.
    #[serde(default = "empty_params")]
    pub params: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_key: Option<String>,
}

fn empty_params() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlanLogging {
    #[serde(default)]
    pub sample_rate: f32,
    #[serde(default)]
    pub dump_keys: Vec<i32>,
}

/// A declarative ranking plan: a DAG of operator nodes.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Plan {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: i32,
    #[serde(default)]
    pub meta: PlanMeta,
    pub nodes: Vec<PlanNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<PlanLogging>,
}

fn default_version() -> i32 {
    1
}

impl Plan {
    pub fn from_json_file(path: impl AsRef<Path>) -> error_stack::Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .into_report()
            .change_context_lazy(|| Error::ReadPlan(path.display().to_string()))?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(json: &str) -> error_stack::Result<Self, Error> {
        serde_json::from_str(json)
            .into_report()
            .change_context(Error::JsonParse)
    }
}

/// Check a `trace_key`: at most [`MAX_TRACE_KEY_LEN`] characters from
/// `[A-Za-z0-9._/-]`.
pub fn validate_trace_key(trace_key: &str) -> Result<(), String> {
    if trace_key.len() > MAX_TRACE_KEY_LEN {
        return Err(format!(
            "length {} exceeds maximum {MAX_TRACE_KEY_LEN}",
            trace_key.len()
        ));
    }
    match trace_key
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '-')))
    {
        Some(bad) => Err(format!("character {bad:?} not in [A-Za-z0-9._/-]")),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN_JSON: &str = r#"{
        "name": "linear",
        "version": 2,
        "meta": {"env": "prod"},
        "nodes": [
            {"id": "src", "op": "core:sourcer", "inputs": [], "params": {"k": 3}},
            {"id": "score", "op": "core:score_formula", "inputs": ["src"],
             "params": {}, "trace_key": "main"}
        ],
        "logging": {"sample_rate": 0.5, "dump_keys": [3999]}
    }"#;

    #[test]
    fn test_parse_plan() {
        let plan = Plan::from_json_str(PLAN_JSON).unwrap();
        assert_eq!(plan.name, "linear");
        assert_eq!(plan.version, 2);
        assert_eq!(plan.meta.env, PlanEnv::Prod);
        assert_eq!(plan.nodes.len(), 2);
        assert_eq!(plan.nodes[1].inputs, vec!["src"]);
        assert_eq!(plan.nodes[1].trace_key.as_deref(), Some("main"));
        assert_eq!(plan.logging.as_ref().unwrap().dump_keys, vec![3999]);
    }

    #[test]
    fn test_defaults() {
        let plan = Plan::from_json_str(
            r#"{"name": "minimal", "nodes": [{"id": "a", "op": "core:sourcer"}]}"#,
        )
        .unwrap();
        assert_eq!(plan.version, 1);
        assert_eq!(plan.meta.env, PlanEnv::Dev);
        assert!(plan.nodes[0].inputs.is_empty());
        assert!(plan.nodes[0].params.is_object());
        assert!(plan.logging.is_none());
    }

    #[test]
    fn test_unknown_env_rejected() {
        let err = Plan::from_json_str(
            r#"{"name": "p", "meta": {"env": "staging"}, "nodes": []}"#,
        )
        .unwrap_err();
        assert!(matches!(err.current_context(), Error::JsonParse));
    }

    #[test]
    fn test_env_is_case_sensitive() {
        let err =
            Plan::from_json_str(r#"{"name": "p", "meta": {"env": "PROD"}, "nodes": []}"#)
                .unwrap_err();
        assert!(matches!(err.current_context(), Error::JsonParse));
    }

    #[test]
    fn test_round_trip() {
        let plan = Plan::from_json_str(PLAN_JSON).unwrap();
        let serialized = serde_json::to_string(&plan).unwrap();
        let reparsed = Plan::from_json_str(&serialized).unwrap();
        assert_eq!(plan, reparsed);
    }

    #[test]
    fn test_validate_trace_key() {
        assert!(validate_trace_key("a/b.c_d-1").is_ok());
        assert!(validate_trace_key("").is_ok());
        assert!(validate_trace_key("has space").is_err());
        assert!(validate_trace_key("colon:bad").is_err());
        assert!(validate_trace_key(&"x".repeat(64)).is_ok());
        assert!(validate_trace_key(&"x".repeat(65)).is_err());
    }
}
