use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use error_stack::{Report, ResultExt};
use rhai::{Dynamic, Engine, EvalAltResult, Scope};
use shrike_batch::{BatchBuilder, ColumnBatch};
use shrike_core::KeyRegistry;
use shrike_nodes::{
    ExecContext, InputMode, NodeSpec, Operator, OperatorFactory, Stability, WritesDescriptor,
};

use crate::{read_csv, validate_resource, BatchContext, BudgetTracker, Error, GuestMeta};

/// Per-invocation interpreter operation cap; breaching it cancels the
/// module with [`Error::InstructionLimit`].
const MAX_GUEST_OPERATIONS: u64 = 1_000_000;

inventory::submit!(OperatorFactory {
    spec: NodeSpec {
        op: "script:module",
        namespace_path: "script.module",
        stability: Stability::Experimental,
        doc: "Runs a sandboxed guest module; writes are declared by the module's meta.",
        input_mode: InputMode::Single,
        params_schema: r#"{
            "type": "object",
            "properties": {
                "module": {"type": "string"}
            },
            "required": ["module"]
        }"#,
        reads: &[],
        writes: WritesDescriptor::ParamDerived { param_name: "module" },
    },
    create: &|| Box::new(GuestModuleRunner),
});

/// `script:module` -- loads a rhai guest module and runs it against the
/// input batch under the sandbox contract.
///
/// The interpreter is created fresh per invocation and exposes no
/// filesystem, network, or process APIs; the module touches the engine only
/// through `ctx.batch` (typed, budget-gated) and, when policy allows,
/// `ctx.io.read_csv`.
pub struct GuestModuleRunner;

impl Operator for GuestModuleRunner {
    fn run(
        &self,
        ctx: &ExecContext<'_>,
        input: &ColumnBatch,
        params: &serde_json::Value,
    ) -> error_stack::Result<ColumnBatch, shrike_nodes::Error> {
        let Some(module_path) = params.get("module").and_then(serde_json::Value::as_str)
        else {
            return Err(Report::new(Error::MissingModule(
                "params.module is not set".to_owned(),
            ))
            .change_context(shrike_nodes::Error::GuestModule));
        };

        let source = std::fs::read_to_string(module_path).map_err(|_| {
            Report::new(Error::MissingModule(module_path.to_owned()))
                .change_context(shrike_nodes::Error::GuestModule)
        })?;

        if input.row_count() == 0 {
            return Ok(input.clone());
        }

        execute_module(ctx, input, params, module_path, &source)
            .change_context(shrike_nodes::Error::GuestModule)
    }
}

/// Host-side state shared with the interpreter handles.
struct GuestState {
    context: BatchContext,
    keys_map: rhai::Map,
    csv_assets_dir: Option<PathBuf>,
    io_enabled: bool,
    /// First typed violation raised inside a host callback; wins over the
    /// interpreter's stringly error when classifying a failure.
    violation: Option<Error>,
}

type SharedState = Rc<RefCell<GuestState>>;

#[derive(Clone)]
struct GuestCtx {
    state: SharedState,
}

#[derive(Clone)]
struct GuestBatch {
    state: SharedState,
}

#[derive(Clone)]
struct GuestIo {
    state: SharedState,
}

#[derive(Clone)]
struct F32Writer {
    cells: Rc<RefCell<Vec<f64>>>,
}

#[derive(Clone)]
struct I64Writer {
    cells: Rc<RefCell<Vec<i64>>>,
}

/// Flat N x D writer; indexed by `row * dim + d`.
#[derive(Clone)]
struct F32VecWriter {
    dim: i64,
    cells: Rc<RefCell<Vec<f64>>>,
}

fn execute_module(
    ctx: &ExecContext<'_>,
    input: &ColumnBatch,
    params: &serde_json::Value,
    module_path: &str,
    source: &str,
) -> error_stack::Result<ColumnBatch, Error> {
    let mut engine = Engine::new();
    engine.set_max_operations(MAX_GUEST_OPERATIONS);

    let keys_map = keys_constants(ctx.registry);
    let key_info_map = key_info_constants(ctx.registry);

    let ast = engine.compile(source).map_err(|parse_error| {
        Report::new(Error::ModuleLoad(module_path.to_owned()))
            .attach_printable(parse_error.to_string())
    })?;

    let mut scope = Scope::new();
    scope.push_constant("Keys", keys_map.clone());
    scope.push_constant("KeyInfo", key_info_map);

    // Top-level statements define `meta` (and may reference Keys).
    engine
        .run_ast_with_scope(&mut scope, &ast)
        .map_err(|err| classify(err, None, false, false, module_path))?;

    let meta_map = scope.get_value::<rhai::Map>("meta").ok_or_else(|| {
        Report::new(Error::MetaInvalid(
            "module does not define a 'meta' constant".to_owned(),
        ))
    })?;
    let meta = GuestMeta::parse(&meta_map)?;

    let io_requested = meta.capabilities.io.csv_read;
    let io_allowed = io_requested
        && ctx
            .policy
            .map(|policy| policy.allows_csv_read(&meta.name, &meta.version))
            .unwrap_or(false);
    let csv_assets_dir = if io_allowed {
        ctx.policy.map(|policy| policy.csv_assets_dir().to_path_buf())
    } else {
        None
    };
    if io_requested && !io_allowed {
        tracing::debug!(
            module = %meta.name,
            version = %meta.version,
            "module requests csv_read but policy denies it"
        );
    }

    let state: SharedState = Rc::new(RefCell::new(GuestState {
        context: BatchContext::new(
            input.clone(),
            ctx.registry.clone(),
            meta.writes.clone(),
            BudgetTracker::new(meta.budget),
        ),
        keys_map,
        csv_assets_dir,
        io_enabled: io_allowed,
        violation: None,
    }));
    register_api(&mut engine);

    let rows = rhai::Array::new();
    let params_dynamic = rhai::serde::to_dynamic(params)
        .map_err(|err| Report::new(Error::Guest(err.to_string())))?;
    let guest_ctx = GuestCtx {
        state: Rc::clone(&state),
    };

    let call = engine.call_fn::<Dynamic>(
        &mut scope,
        &ast,
        "run",
        (Dynamic::from(rows), Dynamic::from(guest_ctx), params_dynamic),
    );
    if let Err(err) = call {
        return Err(classify(
            err,
            Some(&state),
            io_requested,
            io_allowed,
            module_path,
        ));
    }

    // Copy writer buffers back into host columns; unchanged columns share.
    let mut builder = BatchBuilder::from_source(input).with_registry(ctx.registry);
    state.borrow_mut().context.commit_into(&mut builder)?;
    Ok(builder.build())
}

/// Map an interpreter failure to the typed sandbox error.
fn classify(
    err: Box<EvalAltResult>,
    state: Option<&SharedState>,
    io_requested: bool,
    io_installed: bool,
    module_path: &str,
) -> Report<Error> {
    if let Some(state) = state {
        if let Some(violation) = state.borrow_mut().violation.take() {
            return Report::new(violation);
        }
    }
    if hit_operation_limit(&err) {
        return Report::new(Error::InstructionLimit);
    }
    if io_requested && !io_installed && err.to_string().contains("read_csv") {
        return Report::new(Error::IoNotEnabled);
    }
    if let EvalAltResult::ErrorFunctionNotFound(name, _) = err.as_ref() {
        if name.starts_with("run") {
            return Report::new(Error::ModuleLoad(module_path.to_owned()))
                .attach_printable("module does not define an entry point 'run'");
        }
    }
    Report::new(Error::Guest(err.to_string()))
}

fn hit_operation_limit(err: &EvalAltResult) -> bool {
    match err {
        EvalAltResult::ErrorTooManyOperations(_) => true,
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => hit_operation_limit(inner),
        _ => false,
    }
}

/// Record the first violation and surface it as an interpreter error.
fn raise(state: &SharedState, error: Error) -> Box<EvalAltResult> {
    let message = error.to_string();
    {
        let mut state = state.borrow_mut();
        if state.violation.is_none() {
            state.violation = Some(error);
        }
    }
    EvalAltResult::ErrorRuntime(message.into(), rhai::Position::NONE).into()
}

fn index_error(index: i64, len: usize) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(
        format!("writer index {index} out of bounds (len {len})").into(),
        rhai::Position::NONE,
    )
    .into()
}

/// `Keys.<NAME>` constants: registry names uppercased with `.` -> `_`.
fn keys_constants(registry: &KeyRegistry) -> rhai::Map {
    let mut map = rhai::Map::new();
    for key in registry.keys() {
        map.insert(constant_name(&key.name).into(), Dynamic::from(key.id as i64));
    }
    map
}

/// `KeyInfo.<NAME>` constants: `{id, name, type}` per key.
fn key_info_constants(registry: &KeyRegistry) -> rhai::Map {
    let mut map = rhai::Map::new();
    for key in registry.keys() {
        let mut info = rhai::Map::new();
        info.insert("id".into(), Dynamic::from(key.id as i64));
        info.insert("name".into(), Dynamic::from(key.name.clone()));
        info.insert(
            "type".into(),
            Dynamic::from(key.key_type.to_string()),
        );
        map.insert(constant_name(&key.name).into(), Dynamic::from(info));
    }
    map
}

fn constant_name(key_name: &str) -> String {
    key_name
        .chars()
        .map(|c| if c == '.' { '_' } else { c.to_ascii_uppercase() })
        .collect()
}

/// Register the `ctx` API surface on a fresh engine.
fn register_api(engine: &mut Engine) {
    engine
        .register_type_with_name::<GuestCtx>("EngineContext")
        .register_get("batch", |ctx: &mut GuestCtx| GuestBatch {
            state: Rc::clone(&ctx.state),
        })
        .register_get("keys", |ctx: &mut GuestCtx| {
            ctx.state.borrow().keys_map.clone()
        })
        .register_get("io", |ctx: &mut GuestCtx| -> Dynamic {
            let enabled = ctx.state.borrow().io_enabled;
            if enabled {
                Dynamic::from(GuestIo {
                    state: Rc::clone(&ctx.state),
                })
            } else {
                Dynamic::UNIT
            }
        });

    engine
        .register_type_with_name::<GuestBatch>("Batch")
        .register_get("row_count", |batch: &mut GuestBatch| {
            batch.state.borrow().context.row_count() as i64
        })
        .register_fn("f32", |batch: &mut GuestBatch, key_id: i64| -> Dynamic {
            match batch.state.borrow().context.f32_cells(key_id as i32) {
                Some(cells) => Dynamic::from(
                    cells.into_iter().map(Dynamic::from).collect::<rhai::Array>(),
                ),
                None => Dynamic::UNIT,
            }
        })
        .register_fn("i64", |batch: &mut GuestBatch, key_id: i64| -> Dynamic {
            match batch.state.borrow().context.i64_cells(key_id as i32) {
                Some(cells) => Dynamic::from(
                    cells.into_iter().map(Dynamic::from).collect::<rhai::Array>(),
                ),
                None => Dynamic::UNIT,
            }
        })
        .register_fn("f32vec", |batch: &mut GuestBatch, key_id: i64| -> Dynamic {
            match batch.state.borrow().context.f32vec_cells(key_id as i32) {
                Some((cells, dim, row_count)) => {
                    let mut view = rhai::Map::new();
                    view.insert(
                        "data".into(),
                        Dynamic::from(
                            cells.into_iter().map(Dynamic::from).collect::<rhai::Array>(),
                        ),
                    );
                    view.insert("dim".into(), Dynamic::from(dim as i64));
                    view.insert("row_count".into(), Dynamic::from(row_count as i64));
                    Dynamic::from(view)
                }
                None => Dynamic::UNIT,
            }
        })
        .register_fn(
            "write_f32",
            |batch: &mut GuestBatch, key_id: i64| -> Result<F32Writer, Box<EvalAltResult>> {
                let state = Rc::clone(&batch.state);
                let allocated = { state.borrow_mut().context.allocate_f32(key_id as i32) };
                match allocated {
                    Ok(cells) => Ok(F32Writer { cells }),
                    Err(error) => Err(raise(&state, error)),
                }
            },
        )
        .register_fn(
            "write_i64",
            |batch: &mut GuestBatch, key_id: i64| -> Result<I64Writer, Box<EvalAltResult>> {
                let state = Rc::clone(&batch.state);
                let allocated = { state.borrow_mut().context.allocate_i64(key_id as i32) };
                match allocated {
                    Ok(cells) => Ok(I64Writer { cells }),
                    Err(error) => Err(raise(&state, error)),
                }
            },
        )
        .register_fn(
            "write_f32vec",
            |batch: &mut GuestBatch,
             key_id: i64,
             dim: i64|
             -> Result<F32VecWriter, Box<EvalAltResult>> {
                let state = Rc::clone(&batch.state);
                let allocated = {
                    state
                        .borrow_mut()
                        .context
                        .allocate_f32vec(key_id as i32, dim.max(0) as usize)
                };
                match allocated {
                    Ok(cells) => Ok(F32VecWriter { dim, cells }),
                    Err(error) => Err(raise(&state, error)),
                }
            },
        );

    engine
        .register_type_with_name::<F32Writer>("F32Writer")
        .register_fn("len", |writer: &mut F32Writer| {
            writer.cells.borrow().len() as i64
        })
        .register_indexer_get(
            |writer: &mut F32Writer, index: i64| -> Result<f64, Box<EvalAltResult>> {
                let cells = writer.cells.borrow();
                cells
                    .get(index as usize)
                    .copied()
                    .ok_or_else(|| index_error(index, cells.len()))
            },
        )
        .register_indexer_set(
            |writer: &mut F32Writer, index: i64, value: f64| -> Result<(), Box<EvalAltResult>> {
                let mut cells = writer.cells.borrow_mut();
                let len = cells.len();
                match cells.get_mut(index as usize) {
                    Some(cell) => {
                        *cell = value;
                        Ok(())
                    }
                    None => Err(index_error(index, len)),
                }
            },
        )
        .register_indexer_set(
            |writer: &mut F32Writer, index: i64, value: i64| -> Result<(), Box<EvalAltResult>> {
                let mut cells = writer.cells.borrow_mut();
                let len = cells.len();
                match cells.get_mut(index as usize) {
                    Some(cell) => {
                        *cell = value as f64;
                        Ok(())
                    }
                    None => Err(index_error(index, len)),
                }
            },
        );

    engine
        .register_type_with_name::<I64Writer>("I64Writer")
        .register_fn("len", |writer: &mut I64Writer| {
            writer.cells.borrow().len() as i64
        })
        .register_indexer_get(
            |writer: &mut I64Writer, index: i64| -> Result<i64, Box<EvalAltResult>> {
                let cells = writer.cells.borrow();
                cells
                    .get(index as usize)
                    .copied()
                    .ok_or_else(|| index_error(index, cells.len()))
            },
        )
        .register_indexer_set(
            |writer: &mut I64Writer, index: i64, value: i64| -> Result<(), Box<EvalAltResult>> {
                let mut cells = writer.cells.borrow_mut();
                let len = cells.len();
                match cells.get_mut(index as usize) {
                    Some(cell) => {
                        *cell = value;
                        Ok(())
                    }
                    None => Err(index_error(index, len)),
                }
            },
        );

    engine
        .register_type_with_name::<F32VecWriter>("F32VecWriter")
        .register_get("dim", |writer: &mut F32VecWriter| writer.dim)
        .register_fn("len", |writer: &mut F32VecWriter| {
            writer.cells.borrow().len() as i64
        })
        .register_indexer_get(
            |writer: &mut F32VecWriter, index: i64| -> Result<f64, Box<EvalAltResult>> {
                let cells = writer.cells.borrow();
                cells
                    .get(index as usize)
                    .copied()
                    .ok_or_else(|| index_error(index, cells.len()))
            },
        )
        .register_indexer_set(
            |writer: &mut F32VecWriter,
             index: i64,
             value: f64|
             -> Result<(), Box<EvalAltResult>> {
                let mut cells = writer.cells.borrow_mut();
                let len = cells.len();
                match cells.get_mut(index as usize) {
                    Some(cell) => {
                        *cell = value;
                        Ok(())
                    }
                    None => Err(index_error(index, len)),
                }
            },
        )
        .register_indexer_set(
            |writer: &mut F32VecWriter,
             index: i64,
             value: i64|
             -> Result<(), Box<EvalAltResult>> {
                let mut cells = writer.cells.borrow_mut();
                let len = cells.len();
                match cells.get_mut(index as usize) {
                    Some(cell) => {
                        *cell = value as f64;
                        Ok(())
                    }
                    None => Err(index_error(index, len)),
                }
            },
        );

    engine
        .register_type_with_name::<GuestIo>("Io")
        .register_fn(
            "read_csv",
            |io: &mut GuestIo, resource: &str| -> Result<rhai::Map, Box<EvalAltResult>> {
                let state = Rc::clone(&io.state);
                read_csv_resource(&state, resource).map_err(|error| raise(&state, error))
            },
        )
        .register_fn(
            "read_csv",
            |io: &mut GuestIo,
             resource: &str,
             _opts: rhai::Map|
             -> Result<rhai::Map, Box<EvalAltResult>> {
                let state = Rc::clone(&io.state);
                read_csv_resource(&state, resource).map_err(|error| raise(&state, error))
            },
        );
}

fn read_csv_resource(state: &SharedState, resource: &str) -> Result<rhai::Map, Error> {
    validate_resource(resource)?;
    let assets_dir = state
        .borrow()
        .csv_assets_dir
        .clone()
        .ok_or(Error::IoNotEnabled)?;
    let path = assets_dir.join(resource);
    let table = {
        let mut guard = state.borrow_mut();
        read_csv(&path, guard.context.budget())?
    };

    let mut columns = rhai::Map::new();
    for (header, cells) in table.headers.iter().zip(&table.columns) {
        columns.insert(
            header.as_str().into(),
            Dynamic::from(
                cells
                    .iter()
                    .map(|cell| Dynamic::from(cell.clone()))
                    .collect::<rhai::Array>(),
            ),
        );
    }
    let mut result = rhai::Map::new();
    result.insert("columns".into(), Dynamic::from(columns));
    result.insert("row_count".into(), Dynamic::from(table.row_count));
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use shrike_batch::{F32Column, TypedColumn};
    use shrike_core::{keys, Value};
    use shrike_nodes::ModulePolicy;

    use super::*;

    fn write_module(script: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".rhai")
            .tempfile()
            .unwrap();
        file.write_all(script.as_bytes()).unwrap();
        file
    }

    fn input_batch(rows: usize) -> ColumnBatch {
        let base: Vec<f32> = (0..rows).map(|i| 1.0 - i as f32 / rows as f32).collect();
        let mut batch = ColumnBatch::with_row_count(rows);
        batch
            .set_column(
                keys::id::SCORE_BASE,
                Arc::new(TypedColumn::F32(F32Column::from_values(base))),
            )
            .unwrap();
        batch
    }

    fn run_module(
        script: &str,
        input: &ColumnBatch,
        policy: Option<&ModulePolicy>,
    ) -> error_stack::Result<ColumnBatch, shrike_nodes::Error> {
        let module = write_module(script);
        let registry = KeyRegistry::from_builtin();
        let mut ctx = ExecContext::new(&registry);
        if let Some(policy) = policy {
            ctx = ctx.with_policy(policy);
        }
        let params =
            serde_json::json!({"module": module.path().to_str().unwrap()});
        GuestModuleRunner.run(&ctx, input, &params)
    }

    const DOUBLE_BASE: &str = r#"
        const meta = #{
            name: "double_base",
            version: "1.0",
            reads: [Keys.SCORE_BASE],
            writes: [Keys.SCORE_ML],
        };

        fn run(rows, ctx, params) {
            let base = ctx.batch.f32(ctx.keys.SCORE_BASE);
            let out = ctx.batch.write_f32(ctx.keys.SCORE_ML);
            for i in 0..ctx.batch.row_count {
                out[i] = base[i] * 2.0;
            }
        }
    "#;

    #[test]
    fn test_module_writes_committed() {
        let input = input_batch(4);
        let output = run_module(DOUBLE_BASE, &input, None).unwrap();
        assert_eq!(output.value(0, keys::id::SCORE_ML), Value::F32(2.0));
        assert_eq!(output.value(2, keys::id::SCORE_ML), Value::F32(1.0));
        // Unchanged columns share handles with the input.
        assert!(Arc::ptr_eq(
            input.column(keys::id::SCORE_BASE).unwrap(),
            output.column(keys::id::SCORE_BASE).unwrap()
        ));
    }

    #[test]
    fn test_write_not_declared() {
        let script = r#"
            const meta = #{ name: "sneaky", version: "1.0", writes: [Keys.SCORE_ML] };
            fn run(rows, ctx, params) {
                ctx.batch.write_f32(ctx.keys.SCORE_FINAL);
            }
        "#;
        let input = input_batch(4);
        let err = run_module(script, &input, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::WriteNotDeclared(id)) if *id == keys::id::SCORE_FINAL
        ));
    }

    #[test]
    fn test_write_budget_enforced() {
        let script = r#"
            const meta = #{
                name: "greedy",
                version: "1.0",
                writes: [Keys.SCORE_ML],
                budget: #{ max_write_cells: 10 },
            };
            fn run(rows, ctx, params) {
                ctx.batch.write_f32(ctx.keys.SCORE_ML);
            }
        "#;
        let input = input_batch(100);
        let err = run_module(script, &input, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::BudgetExceeded {
                what: "max_write_cells",
                limit: 10
            })
        ));
    }

    #[test]
    fn test_empty_writes_cannot_alter_columns() {
        let script = r#"
            const meta = #{ name: "inert", version: "1.0", writes: [] };
            fn run(rows, ctx, params) {
                let base = ctx.batch.f32(ctx.keys.SCORE_BASE);
                base[0] = 99.0;
            }
        "#;
        let input = input_batch(3);
        let output = run_module(script, &input, None).unwrap();
        // Reader arrays are copies; every column handle is shared untouched.
        for key_id in input.column_keys() {
            assert!(Arc::ptr_eq(
                input.column(key_id).unwrap(),
                output.column(key_id).unwrap()
            ));
        }
        assert_eq!(input.value(0, keys::id::SCORE_BASE), Value::F32(1.0));
    }

    #[test]
    fn test_f32vec_writer_round_trip() {
        let script = r#"
            const meta = #{
                name: "embedder",
                version: "1.0",
                writes: [Keys.FEAT_EMBEDDING],
            };
            fn run(rows, ctx, params) {
                let out = ctx.batch.write_f32vec(ctx.keys.FEAT_EMBEDDING, 2);
                for row in 0..ctx.batch.row_count {
                    out[row * out.dim] = 1.0;
                    out[row * out.dim + 1] = row;
                }
            }
        "#;
        let input = input_batch(3);
        let output = run_module(script, &input, None).unwrap();
        let embedding = output.f32vec_column(keys::id::FEAT_EMBEDDING).unwrap();
        assert_eq!(embedding.dim(), 2);
        assert_eq!(embedding.row(0), &[1.0, 0.0]);
        assert_eq!(embedding.row(2), &[1.0, 2.0]);
    }

    #[test]
    fn test_instruction_limit() {
        let script = r#"
            const meta = #{ name: "spinner", version: "1.0" };
            fn run(rows, ctx, params) {
                loop { }
            }
        "#;
        let input = input_batch(1);
        let err = run_module(script, &input, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InstructionLimit)
        ));
    }

    #[test]
    fn test_missing_meta() {
        let script = r#"fn run(rows, ctx, params) { }"#;
        let input = input_batch(1);
        let err = run_module(script, &input, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::MetaInvalid(_))
        ));
    }

    #[test]
    fn test_missing_entry_point() {
        let script = r#"const meta = #{ name: "no_entry", version: "1.0" };"#;
        let input = input_batch(1);
        let err = run_module(script, &input, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::ModuleLoad(_))
        ));
    }

    #[test]
    fn test_missing_module_file() {
        let registry = KeyRegistry::from_builtin();
        let ctx = ExecContext::new(&registry);
        let params = serde_json::json!({"module": "/nonexistent/module.rhai"});
        let err = GuestModuleRunner
            .run(&ctx, &input_batch(1), &params)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::MissingModule(_))
        ));
    }

    #[test]
    fn test_no_host_apis_reachable() {
        let script = r#"
            const meta = #{ name: "prober", version: "1.0" };
            fn run(rows, ctx, params) {
                open_file("/etc/passwd");
            }
        "#;
        let input = input_batch(1);
        let err = run_module(script, &input, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Guest(_))
        ));
    }

    #[test]
    fn test_zero_row_input_passes_through() {
        let input = ColumnBatch::empty();
        let output = run_module(DOUBLE_BASE, &input, None).unwrap();
        assert_eq!(output.row_count(), 0);
    }

    mod io {
        use super::*;

        const CSV_READER: &str = r#"
            const meta = #{
                name: "csv_reader",
                version: "1.0",
                writes: [Keys.SCORE_ML],
                budget: #{ max_io_read_bytes: 4096, max_io_read_rows: 100 },
                capabilities: #{ io: #{ csv_read: true } },
            };

            fn run(rows, ctx, params) {
                let table = ctx.io.read_csv("data.csv");
                let boosts = table.columns.boost;
                let out = ctx.batch.write_f32(ctx.keys.SCORE_ML);
                for i in 0..ctx.batch.row_count {
                    if i < table.row_count {
                        out[i] = parse_float(boosts[i]);
                    }
                }
            }
        "#;

        fn policy_for(assets_dir: &std::path::Path, allow: bool) -> ModulePolicy {
            let modules = if allow {
                r#"[{"name": "csv_reader", "allow_io_csv_read": true}]"#
            } else {
                "[]"
            };
            ModulePolicy::from_json_str(&format!(
                r#"{{"csv_assets_dir": {:?}, "modules": {modules}}}"#,
                assets_dir.to_str().unwrap()
            ))
            .unwrap()
        }

        fn write_assets() -> tempfile::TempDir {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("data.csv"), "boost\n0.5\n0.25\n").unwrap();
            dir
        }

        #[test]
        fn test_csv_read_allowed() {
            let assets = write_assets();
            let policy = policy_for(assets.path(), true);
            let input = input_batch(2);
            let output = run_module(CSV_READER, &input, Some(&policy)).unwrap();
            assert_eq!(output.value(0, keys::id::SCORE_ML), Value::F32(0.5));
            assert_eq!(output.value(1, keys::id::SCORE_ML), Value::F32(0.25));
        }

        #[test]
        fn test_csv_read_denied_by_policy() {
            let assets = write_assets();
            let policy = policy_for(assets.path(), false);
            let input = input_batch(2);
            let err = run_module(CSV_READER, &input, Some(&policy)).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<Error>(),
                Some(Error::IoNotEnabled)
            ));
        }

        #[test]
        fn test_io_undefined_without_policy_entry() {
            let script = r#"
                const meta = #{
                    name: "checker",
                    version: "1.0",
                    capabilities: #{ io: #{ csv_read: true } },
                };
                fn run(rows, ctx, params) {
                    if ctx.io != () {
                        throw "io should be undefined";
                    }
                }
            "#;
            let assets = write_assets();
            let policy = policy_for(assets.path(), false);
            let input = input_batch(1);
            run_module(script, &input, Some(&policy)).unwrap();
        }

        #[test]
        fn test_path_traversal_rejected() {
            let script = r#"
                const meta = #{
                    name: "csv_reader",
                    version: "1.0",
                    budget: #{ max_io_read_bytes: 4096, max_io_read_rows: 100 },
                    capabilities: #{ io: #{ csv_read: true } },
                };
                fn run(rows, ctx, params) {
                    ctx.io.read_csv("../escape.csv");
                }
            "#;
            let assets = write_assets();
            let policy = policy_for(assets.path(), true);
            let input = input_batch(1);
            let err = run_module(script, &input, Some(&policy)).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<Error>(),
                Some(Error::PathTraversal { .. })
            ));
        }

        #[test]
        fn test_io_budget_exceeded() {
            let script = r#"
                const meta = #{
                    name: "csv_reader",
                    version: "1.0",
                    budget: #{ max_io_read_bytes: 4096, max_io_read_rows: 1 },
                    capabilities: #{ io: #{ csv_read: true } },
                };
                fn run(rows, ctx, params) {
                    ctx.io.read_csv("data.csv");
                }
            "#;
            let assets = write_assets();
            let policy = policy_for(assets.path(), true);
            let input = input_batch(1);
            let err = run_module(script, &input, Some(&policy)).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<Error>(),
                Some(Error::IoBudgetExceeded { .. })
            ));
        }
    }
}
