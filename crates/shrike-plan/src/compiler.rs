use hashbrown::{HashMap, HashSet};
use shrike_core::KeyRegistry;
use shrike_nodes::{OperatorRegistry, Stability};

use crate::{
    check_budget, compute_metrics, validate_trace_key, ComplexityBudget,
    ComplexityMetrics, Error, Plan, PlanEnv,
};

/// A validated plan ready for execution.
///
/// Owns everything it needs; nothing borrows from the input JSON.
#[derive(Clone, Debug)]
pub struct CompiledPlan {
    pub plan: Plan,
    /// Node ids in execution order.
    pub topo_order: Vec<String>,
    pub complexity: ComplexityMetrics,
}

/// Validates and prepares plans for execution.
///
/// Phases run in order and stop at the first failure: unique ids, trace
/// keys, topological sort, known ops, the prod stability gate, and the
/// complexity budget. Metrics are computed (and stored) even when budget
/// enforcement is disabled.
pub struct PlanCompiler<'a> {
    registry: &'a KeyRegistry,
    operators: &'a OperatorRegistry,
    budget: ComplexityBudget,
    enforce_budget: bool,
}

impl<'a> PlanCompiler<'a> {
    pub fn new(registry: &'a KeyRegistry, operators: &'a OperatorRegistry) -> Self {
        Self {
            registry,
            operators,
            budget: ComplexityBudget::default(),
            enforce_budget: true,
        }
    }

    pub fn with_budget(mut self, budget: ComplexityBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Skip budget enforcement; metrics are still computed.
    pub fn without_budget_enforcement(mut self) -> Self {
        self.enforce_budget = false;
        self
    }

    pub fn compile(&self, plan: Plan) -> error_stack::Result<CompiledPlan, Error> {
        self.validate_node_ids(&plan)?;
        self.validate_trace_keys(&plan)?;
        let topo_order = self.topological_sort(&plan)?;
        self.validate_ops(&plan)?;
        self.validate_env(&plan)?;

        let complexity = compute_metrics(&plan);
        if self.enforce_budget {
            let warnings = check_budget(&complexity, &self.budget)?;
            for warning in warnings {
                tracing::warn!(plan = %plan.name, %warning, "complexity soft limit exceeded");
                shrike_trace::log_compile_warning(&plan.name, &warning);
            }
        }
        self.check_dump_keys(&plan);

        Ok(CompiledPlan {
            plan,
            topo_order,
            complexity,
        })
    }

    fn validate_node_ids(&self, plan: &Plan) -> error_stack::Result<(), Error> {
        let mut seen = HashSet::with_capacity(plan.nodes.len());
        for node in &plan.nodes {
            error_stack::ensure!(
                seen.insert(node.id.as_str()),
                Error::DuplicateNodeId(node.id.clone())
            );
        }
        Ok(())
    }

    fn validate_trace_keys(&self, plan: &Plan) -> error_stack::Result<(), Error> {
        for node in &plan.nodes {
            if let Some(trace_key) = &node.trace_key {
                if let Err(reason) = validate_trace_key(trace_key) {
                    error_stack::bail!(Error::InvalidTraceKey {
                        node: node.id.clone(),
                        reason,
                    });
                }
            }
        }
        Ok(())
    }

    /// Kahn's algorithm over the `inputs` edges.
    fn topological_sort(&self, plan: &Plan) -> error_stack::Result<Vec<String>, Error> {
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        for node in &plan.nodes {
            dependents.entry(node.id.as_str()).or_default();
            in_degree.insert(node.id.as_str(), node.inputs.len());
            for input in &node.inputs {
                dependents.entry(input.as_str()).or_default().push(node.id.as_str());
            }
        }

        let mut queue: std::collections::VecDeque<&str> = plan
            .nodes
            .iter()
            .filter(|node| node.inputs.is_empty())
            .map(|node| node.id.as_str())
            .collect();

        let mut order = Vec::with_capacity(plan.nodes.len());
        while let Some(current) = queue.pop_front() {
            order.push(current.to_owned());
            for &dependent in dependents.get(current).map(Vec::as_slice).unwrap_or(&[]) {
                let degree = in_degree
                    .get_mut(dependent)
                    .expect("every node has an in-degree entry");
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        // Unemitted nodes are on a cycle (or reference undeclared inputs,
        // which never become ready either).
        error_stack::ensure!(order.len() == plan.nodes.len(), Error::GraphCycle);
        Ok(order)
    }

    fn validate_ops(&self, plan: &Plan) -> error_stack::Result<(), Error> {
        for node in &plan.nodes {
            error_stack::ensure!(
                self.operators.has_op(&node.op),
                Error::UnknownOp {
                    node: node.id.clone(),
                    op: node.op.clone(),
                }
            );
        }
        Ok(())
    }

    /// In prod, every referenced op must be stable.
    fn validate_env(&self, plan: &Plan) -> error_stack::Result<(), Error> {
        if plan.meta.env != PlanEnv::Prod {
            return Ok(());
        }
        for node in &plan.nodes {
            if let Some(factory) = self.operators.get(&node.op) {
                error_stack::ensure!(
                    factory.spec.stability == Stability::Stable,
                    Error::ExperimentalInProd {
                        node: node.id.clone(),
                        op: node.op.clone(),
                        namespace: factory.spec.namespace_path.to_owned(),
                    }
                );
            }
        }
        Ok(())
    }

    /// Dump keys are advisory; unknown ids only warn.
    fn check_dump_keys(&self, plan: &Plan) {
        let Some(logging) = &plan.logging else {
            return;
        };
        for &key_id in &logging.dump_keys {
            if self.registry.key(key_id).is_none() {
                tracing::warn!(plan = %plan.name, key_id, "dump key not in registry");
            }
        }
    }
}
