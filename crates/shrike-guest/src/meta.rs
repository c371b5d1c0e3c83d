use hashbrown::HashSet;
use rhai::Dynamic;

use crate::{BudgetLimits, Error};

/// The manifest a guest module declares as its top-level `meta` constant.
#[derive(Clone, Debug, Default)]
pub struct GuestMeta {
    pub name: String,
    pub version: String,
    pub reads: HashSet<i32>,
    pub writes: HashSet<i32>,
    pub params_schema: Option<serde_json::Value>,
    pub budget: BudgetLimits,
    pub capabilities: Capabilities,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Capabilities {
    pub io: IoCapabilities,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct IoCapabilities {
    pub csv_read: bool,
}

impl GuestMeta {
    /// Parse the meta map extracted from the module scope.
    ///
    /// `name` is required; numeric fields are coerced from the guest's
    /// numeric representation (ints or floats); everything else defaults.
    pub fn parse(map: &rhai::Map) -> Result<Self, Error> {
        let mut meta = GuestMeta {
            name: get_string(map, "name")
                .ok_or_else(|| Error::MetaInvalid("missing required field 'name'".to_owned()))?,
            ..GuestMeta::default()
        };
        if let Some(version) = get_string(map, "version") {
            meta.version = version;
        }
        meta.reads = get_key_set(map, "reads")?;
        meta.writes = get_key_set(map, "writes")?;

        if let Some(params) = get(map, "params") {
            meta.params_schema = rhai::serde::from_dynamic(params).ok();
        }

        if let Some(budget) = get_map(map, "budget") {
            let limits = &mut meta.budget;
            if let Some(value) = get_int(&budget, "max_write_bytes") {
                limits.max_write_bytes = value;
            }
            if let Some(value) = get_int(&budget, "max_write_cells") {
                limits.max_write_cells = value;
            }
            if let Some(value) = get_int(&budget, "max_set_per_obj") {
                limits.max_set_per_obj = value;
            }
            if let Some(value) = get_int(&budget, "max_io_read_bytes") {
                limits.max_io_read_bytes = value;
            }
            if let Some(value) = get_int(&budget, "max_io_read_rows") {
                limits.max_io_read_rows = value;
            }
        }

        if let Some(capabilities) = get_map(map, "capabilities") {
            if let Some(io) = get_map(&capabilities, "io") {
                if let Some(csv_read) = get(&io, "csv_read").and_then(|d| d.as_bool().ok()) {
                    meta.capabilities.io.csv_read = csv_read;
                }
            }
        }

        Ok(meta)
    }
}

fn get_map(map: &rhai::Map, name: &str) -> Option<rhai::Map> {
    get(map, name).and_then(|value| value.clone().try_cast::<rhai::Map>())
}

fn get<'a>(map: &'a rhai::Map, name: &str) -> Option<&'a Dynamic> {
    map.iter()
        .find(|(key, _)| key.as_str() == name)
        .map(|(_, value)| value)
}

fn get_string(map: &rhai::Map, name: &str) -> Option<String> {
    let value = get(map, name)?;
    if let Ok(text) = value.clone().into_immutable_string() {
        return Some(text.to_string());
    }
    // Versions are sometimes written as bare numbers.
    coerce_int(value).map(|n| n.to_string())
}

fn get_int(map: &rhai::Map, name: &str) -> Option<i64> {
    get(map, name).and_then(coerce_int)
}

/// The guest's numeric repr may be an int or a float; coerce either.
fn coerce_int(value: &Dynamic) -> Option<i64> {
    if let Ok(int) = value.as_int() {
        return Some(int);
    }
    value.as_float().ok().map(|float| float as i64)
}

fn get_key_set(map: &rhai::Map, name: &str) -> Result<HashSet<i32>, Error> {
    let Some(value) = get(map, name) else {
        return Ok(HashSet::new());
    };
    let items = value.clone().try_cast::<rhai::Array>().ok_or_else(|| {
        Error::MetaInvalid(format!("field '{name}' must be an array of key ids"))
    })?;
    items
        .iter()
        .map(|item| {
            coerce_int(item).map(|id| id as i32).ok_or_else(|| {
                Error::MetaInvalid(format!("field '{name}' contains a non-numeric key id"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_meta(script: &str) -> rhai::Map {
        let engine = rhai::Engine::new();
        let mut scope = rhai::Scope::new();
        engine.run_with_scope(&mut scope, script).unwrap();
        scope.get_value::<rhai::Map>("meta").unwrap()
    }

    #[test]
    fn test_parse_full_meta() {
        let map = eval_meta(
            r#"
            const meta = #{
                name: "boost",
                version: "2.1",
                reads: [3001, 2001],
                writes: [3002],
                budget: #{ max_write_cells: 50, max_io_read_bytes: 1024, max_io_read_rows: 10 },
                capabilities: #{ io: #{ csv_read: true } },
            };
            "#,
        );
        let meta = GuestMeta::parse(&map).unwrap();
        assert_eq!(meta.name, "boost");
        assert_eq!(meta.version, "2.1");
        assert!(meta.reads.contains(&3001) && meta.reads.contains(&2001));
        assert_eq!(meta.writes.len(), 1);
        assert_eq!(meta.budget.max_write_cells, 50);
        assert_eq!(meta.budget.max_io_read_bytes, 1024);
        // Unset budget fields keep defaults.
        assert_eq!(meta.budget.max_write_bytes, 1 << 20);
        assert!(meta.capabilities.io.csv_read);
    }

    #[test]
    fn test_missing_name_rejected() {
        let map = eval_meta(r#"const meta = #{ writes: [] };"#);
        let err = GuestMeta::parse(&map).unwrap_err();
        assert!(matches!(err, Error::MetaInvalid(_)));
    }

    #[test]
    fn test_defaults() {
        let map = eval_meta(r#"const meta = #{ name: "bare" };"#);
        let meta = GuestMeta::parse(&map).unwrap();
        assert!(meta.writes.is_empty());
        assert!(!meta.capabilities.io.csv_read);
        assert_eq!(meta.budget.max_io_read_bytes, 0);
    }

    #[test]
    fn test_float_key_ids_coerced() {
        let map = eval_meta(r#"const meta = #{ name: "m", writes: [3002.0] };"#);
        let meta = GuestMeta::parse(&map).unwrap();
        assert!(meta.writes.contains(&3002));
    }
}
