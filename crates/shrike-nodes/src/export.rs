//! NodeSpec export for out-of-process tooling.

use shrike_core::KeyRegistry;

use crate::{OperatorRegistry, WritesDescriptor};

/// Export every registered NodeSpec as the JSON array consumed by plan
/// tooling. Key ids are resolved to `{id, name}` pairs where the registry
/// knows them.
pub fn export_node_specs(
    operators: &OperatorRegistry,
    keys: &KeyRegistry,
) -> serde_json::Value {
    let specs: Vec<serde_json::Value> = operators
        .specs()
        .into_iter()
        .map(|spec| {
            let params_schema = serde_json::from_str::<serde_json::Value>(spec.params_schema)
                .unwrap_or_else(|_| serde_json::Value::String(spec.params_schema.to_owned()));

            let writes = match spec.writes {
                WritesDescriptor::Static(key_ids) => serde_json::json!({
                    "kind": "static",
                    "keys": key_refs(key_ids, keys),
                }),
                WritesDescriptor::ParamDerived { param_name } => serde_json::json!({
                    "kind": "param_derived",
                    "param_name": param_name,
                }),
            };

            serde_json::json!({
                "op": spec.op,
                "namespace_path": spec.namespace_path,
                "stability": <&str>::from(spec.stability),
                "doc": spec.doc,
                "kind": "core",
                "params_schema": params_schema,
                "reads": key_refs(spec.reads, keys),
                "writes": writes,
            })
        })
        .collect();
    serde_json::Value::Array(specs)
}

fn key_refs(key_ids: &[i32], keys: &KeyRegistry) -> Vec<serde_json::Value> {
    key_ids
        .iter()
        .map(|&id| match keys.key(id) {
            Some(key) => serde_json::json!({"id": id, "name": key.name}),
            None => serde_json::json!({"id": id}),
        })
        .collect()
}
