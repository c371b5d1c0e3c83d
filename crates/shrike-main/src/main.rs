//! The `shrike` binary: load, compile, and execute a ranking plan.
#![warn(
    rust_2018_idioms,
    nonstandard_style,
    future_incompatible,
    clippy::mod_module_files,
    clippy::undocumented_unsafe_blocks
)]

use std::path::PathBuf;

use clap::Parser;
use error_stack::ResultExt;
use shrike_core::{keys, KeyRegistry};
use shrike_execution::Executor;
use shrike_nodes::{global_registry, ModulePolicy};
use shrike_plan::{ComplexityBudget, Plan, PlanCompiler};

// Linking the guest crate registers the `script:module` operator.
use shrike_guest as _;

/// Execute a compiled ranking plan.
#[derive(clap::Parser, Debug)]
#[command(name = "shrike", rename_all = "kebab-case", version)]
struct ShrikeOptions {
    /// Path to the plan JSON file.
    #[arg(required_unless_present = "export_nodes")]
    plan: Option<PathBuf>,

    /// Print the registered NodeSpecs as JSON and exit.
    #[arg(long)]
    export_nodes: bool,

    /// Path to keys.json; compiled-in keys are used if not given.
    #[arg(long, short = 'k')]
    keys: Option<PathBuf>,

    /// Path to a complexity budget JSON file.
    #[arg(long)]
    budget: Option<PathBuf>,

    /// Path to a guest-module policy JSON file.
    #[arg(long)]
    policy: Option<PathBuf>,

    /// Number of top results to display after execution.
    #[arg(long, short = 'n', default_value_t = 0)]
    dump_top: usize,

    /// Suppress trace output and result dumping.
    #[arg(long, short = 'q')]
    quiet: bool,
}

#[derive(derive_more::Display, Debug)]
#[display(fmt = "plan execution failed")]
struct Error;

impl error_stack::Context for Error {}

fn main() {
    let options = ShrikeOptions::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    shrike_trace::set_enabled(!options.quiet);

    std::process::exit(match main_body(options) {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!("{err:?}");
            1
        }
    });
}

fn main_body(options: ShrikeOptions) -> error_stack::Result<(), Error> {
    let registry = match &options.keys {
        Some(path) => KeyRegistry::from_json_file(path).change_context(Error)?,
        None => KeyRegistry::from_builtin(),
    };

    if options.export_nodes {
        export_nodes(&registry);
        return Ok(());
    }
    let plan_path = options.plan.as_ref().expect("clap requires plan unless exporting");
    let plan = Plan::from_json_file(plan_path).change_context(Error)?;

    let mut compiler = PlanCompiler::new(&registry, global_registry());
    if let Some(path) = &options.budget {
        let budget = ComplexityBudget::from_json_file(path).change_context(Error)?;
        compiler = compiler.with_budget(budget);
    }
    let compiled = compiler.compile(plan).change_context(Error)?;

    let policy = match &options.policy {
        Some(path) => Some(ModulePolicy::from_json_file(path).change_context(Error)?),
        None => None,
    };

    let mut executor = Executor::new(&registry, global_registry());
    if let Some(policy) = &policy {
        executor = executor.with_policy(policy);
    }
    let result = executor.execute(&compiled).change_context(Error)?;

    if !options.quiet {
        dump_results(&result, options.dump_top);
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn export_nodes(registry: &KeyRegistry) {
    let exported = shrike_nodes::export_node_specs(global_registry(), registry);
    println!("{exported:#}");
}

#[allow(clippy::print_stdout)]
fn dump_results(result: &shrike_batch::ColumnBatch, dump_top: usize) {
    let rows = result.row_count();
    println!("=== Results ({rows} candidates) ===");

    let count = if dump_top > 0 { dump_top.min(rows) } else { rows };
    let ids = result.i64_column(keys::id::CAND_CANDIDATE_ID);
    let scores = result.f32_column(keys::id::SCORE_FINAL);

    for row in 0..count {
        let id = ids
            .filter(|column| !column.is_null(row))
            .map(|column| column.get(row))
            .unwrap_or(0);
        let score = scores
            .filter(|column| !column.is_null(row))
            .map(|column| column.get(row))
            .unwrap_or(0.0);
        println!("  [{row}] candidate_id={id}, score.final={score:.4}");
    }
}
