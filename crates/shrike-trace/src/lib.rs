//! Structured execution tracing.
//!
//! One JSON record per line on stdout, one record per node edge. This is a
//! machine-readable protocol consumed by out-of-process tooling, distinct
//! from the human-oriented `tracing` diagnostics.
#![warn(
    rust_2018_idioms,
    nonstandard_style,
    future_incompatible,
    clippy::mod_module_files,
    clippy::print_stderr,
    clippy::undocumented_unsafe_blocks
)]
// The JSON-lines stream is the tracer's output channel.
#![allow(clippy::print_stdout)]

use std::sync::atomic::{AtomicBool, Ordering};

static ENABLED: AtomicBool = AtomicBool::new(true);

/// Toggle trace output process-wide.
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Extra context for nodes that run guest modules.
#[derive(Clone, Debug, Default)]
pub struct TraceContext {
    /// Prefix for module-local child trace keys (the module file stem).
    pub trace_prefix: Option<String>,
    /// Path of the guest module file.
    pub module_file: Option<String>,
}

/// Identity of one node execution, shared by start and end records.
#[derive(Clone, Debug)]
pub struct NodeEvent<'a> {
    pub plan_name: &'a str,
    pub node_id: &'a str,
    pub op: &'a str,
    pub trace_key: Option<&'a str>,
    pub context: Option<&'a TraceContext>,
}

#[derive(serde::Serialize)]
struct Record<'a> {
    event: &'a str,
    plan_name: &'a str,
    node_id: &'a str,
    op: &'a str,
    span_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rows_in: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rows_out: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_prefix: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    module_file: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl<'a> Record<'a> {
    fn new(event: &'a str, node: &NodeEvent<'a>) -> Self {
        Record {
            event,
            plan_name: node.plan_name,
            node_id: node.node_id,
            op: node.op,
            span_name: span_name(node.op, node.trace_key.unwrap_or("")),
            duration_ms: None,
            rows_in: None,
            rows_out: None,
            trace_prefix: node
                .context
                .and_then(|ctx| ctx.trace_prefix.as_deref()),
            trace_key: node.trace_key.filter(|key| !key.is_empty()),
            module_file: node.context.and_then(|ctx| ctx.module_file.as_deref()),
            error: None,
        }
    }

    fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(line) => println!("{line}"),
            Err(_) => {
                // Trace records are plain data; serialization cannot fail.
            }
        }
    }
}

/// Emit a `node_start` record.
pub fn log_node_start(node: &NodeEvent<'_>) {
    if !is_enabled() {
        return;
    }
    Record::new("node_start", node).emit();
}

/// Emit a `node_end` record with timing, row counts, and any error.
pub fn log_node_end(
    node: &NodeEvent<'_>,
    duration_ms: f64,
    rows_in: usize,
    rows_out: usize,
    error: Option<&str>,
) {
    if !is_enabled() {
        return;
    }
    let mut record = Record::new("node_end", node);
    record.duration_ms = Some(duration_ms);
    record.rows_in = Some(rows_in);
    record.rows_out = Some(rows_out);
    record.error = error;
    record.emit();
}

/// Emit a `compile_warning` record for soft budget breaches.
pub fn log_compile_warning(plan_name: &str, message: &str) {
    if !is_enabled() {
        return;
    }
    let record = serde_json::json!({
        "event": "compile_warning",
        "plan_name": plan_name,
        "message": message,
    });
    println!("{record}");
}

/// The span name for a node: `op` alone, or `"op(trace_key)"`.
pub fn span_name(op: &str, trace_key: &str) -> String {
    if trace_key.is_empty() {
        op.to_owned()
    } else {
        format!("{op}({trace_key})")
    }
}

/// Prefix a module-local child trace key: `"<prefix>::<child>"`.
pub fn prefixed_trace_key(trace_prefix: &str, child_trace_key: &str) -> String {
    if trace_prefix.is_empty() {
        child_trace_key.to_owned()
    } else if child_trace_key.is_empty() {
        trace_prefix.to_owned()
    } else {
        format!("{trace_prefix}::{child_trace_key}")
    }
}

/// Derive a trace prefix from a module path: the file name minus extension.
pub fn derive_trace_prefix(module_path: &str) -> String {
    if module_path.is_empty() {
        return String::new();
    }
    let file_name = module_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(module_path);
    match file_name.rfind('.') {
        Some(dot) if dot > 0 => file_name[..dot].to_owned(),
        _ => file_name.to_owned(),
    }
}
