use std::time::Instant;

use error_stack::ResultExt;
use hashbrown::HashMap;
use shrike_batch::ColumnBatch;
use shrike_core::KeyRegistry;
use shrike_nodes::{ExecContext, InputMode, ModulePolicy, OperatorRegistry};
use shrike_plan::{CompiledPlan, PlanNode};
use shrike_trace::{NodeEvent, TraceContext};

use crate::Error;

/// Runs a compiled plan, node by node, in topological order.
///
/// All per-invocation state lives on this call's stack; concurrent plan
/// executions share nothing but the read-only registries and policy.
pub struct Executor<'a> {
    registry: &'a KeyRegistry,
    operators: &'a OperatorRegistry,
    policy: Option<&'a ModulePolicy>,
}

impl<'a> Executor<'a> {
    pub fn new(registry: &'a KeyRegistry, operators: &'a OperatorRegistry) -> Self {
        Self {
            registry,
            operators,
            policy: None,
        }
    }

    pub fn with_policy(mut self, policy: &'a ModulePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Execute the plan and return the last node's output.
    ///
    /// A node failure aborts the run: its output is discarded and no
    /// downstream node executes. Empty plans return an empty batch.
    pub fn execute(
        &self,
        compiled: &CompiledPlan,
    ) -> error_stack::Result<ColumnBatch, Error> {
        let mut ctx = ExecContext::new(self.registry);
        if let Some(policy) = self.policy {
            ctx = ctx.with_policy(policy);
        }

        let node_by_id: HashMap<&str, &PlanNode> = compiled
            .plan
            .nodes
            .iter()
            .map(|node| (node.id.as_str(), node))
            .collect();

        let mut outputs: HashMap<&str, ColumnBatch> = HashMap::new();
        for node_id in &compiled.topo_order {
            let node = node_by_id.get(node_id.as_str()).copied().ok_or_else(|| {
                error_stack::Report::new(Error::Internal(format!(
                    "topo order references undeclared node '{node_id}'"
                )))
            })?;

            let factory = self.operators.get(&node.op).ok_or_else(|| {
                error_stack::Report::new(Error::UnknownOp {
                    node: node.id.clone(),
                    op: node.op.clone(),
                })
            })?;

            let input = assemble_input(node, factory.spec.input_mode, &outputs)?;

            let trace_context = guest_trace_context(node);
            let event = NodeEvent {
                plan_name: &compiled.plan.name,
                node_id: &node.id,
                op: &node.op,
                trace_key: node.trace_key.as_deref(),
                context: trace_context.as_ref(),
            };
            shrike_trace::log_node_start(&event);

            let operator = (factory.create)();
            let start = Instant::now();
            let result = operator.run(&ctx, &input, &node.params);
            let duration_ms = start.elapsed().as_secs_f64() * 1e3;

            match result {
                Ok(output) => {
                    shrike_trace::log_node_end(
                        &event,
                        duration_ms,
                        input.row_count(),
                        output.row_count(),
                        None,
                    );
                    outputs.insert(node.id.as_str(), output);
                }
                Err(report) => {
                    let error_text = report.current_context().to_string();
                    shrike_trace::log_node_end(
                        &event,
                        duration_ms,
                        input.row_count(),
                        0,
                        Some(&error_text),
                    );
                    tracing::error!(
                        node = %node.id,
                        op = %node.op,
                        error = ?report,
                        "node execution failed"
                    );
                    return Err(report.change_context(Error::NodeFailed {
                        node: node.id.clone(),
                        op: node.op.clone(),
                    }));
                }
            }
        }

        Ok(compiled
            .topo_order
            .last()
            .and_then(|node_id| outputs.remove(node_id.as_str()))
            .unwrap_or_else(ColumnBatch::empty))
    }
}

/// Trace context for nodes that run guest modules: the module file plus a
/// prefix (its file stem) for module-local child trace keys.
fn guest_trace_context(node: &PlanNode) -> Option<TraceContext> {
    let module = node.params.get("module").and_then(serde_json::Value::as_str)?;
    let prefix = shrike_trace::derive_trace_prefix(module);
    Some(TraceContext {
        trace_prefix: (!prefix.is_empty()).then_some(prefix),
        module_file: Some(module.to_owned()),
    })
}

/// Gather a node's input: its single predecessor's output, or the row-wise
/// concatenation of all predecessors for merge-style operators.
fn assemble_input(
    node: &PlanNode,
    input_mode: InputMode,
    outputs: &HashMap<&str, ColumnBatch>,
) -> error_stack::Result<ColumnBatch, Error> {
    let predecessors: Vec<&ColumnBatch> = node
        .inputs
        .iter()
        .filter_map(|input| outputs.get(input.as_str()))
        .collect();

    match input_mode {
        InputMode::Single => Ok(predecessors
            .first()
            .map(|&batch| batch.clone())
            .unwrap_or_else(ColumnBatch::empty)),
        InputMode::Concat => {
            let batches: Vec<ColumnBatch> =
                predecessors.into_iter().cloned().collect();
            shrike_batch::concat(&batches).change_context_lazy(|| Error::AssembleInput {
                node: node.id.clone(),
            })
        }
    }
}
