use std::path::Path;

use error_stack::{IntoReport, ResultExt};
use hashbrown::HashMap;
use index_vec::IndexVec;
use itertools::Itertools;

use crate::{Error, Plan};

/// How many top fan-in/fan-out offenders to keep for diagnostics.
const TOP_K: usize = 5;

/// How many longest-path nodes to print before eliding.
const PATH_PREFIX: usize = 5;

index_vec::define_index_type! {
    /// Dense index of a node within one plan, for the graph passes.
    struct NodeIdx = u32;
}

/// A node and its degree, for top-K offender reporting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DegreeInfo {
    pub id: String,
    pub op: String,
    pub degree: i64,
}

/// Structural metrics of a plan DAG.
#[derive(Clone, Debug, Default)]
pub struct ComplexityMetrics {
    pub node_count: i64,
    pub edge_count: i64,
    pub max_depth: i64,
    pub fanout_peak: i64,
    pub fanin_peak: i64,
    pub top_fanout: Vec<DegreeInfo>,
    pub top_fanin: Vec<DegreeInfo>,
    /// Node ids along one longest path, in execution order.
    pub longest_path: Vec<String>,
}

/// Weights for the scalar complexity score.
#[derive(Clone, Copy, Debug)]
pub struct ScoreWeights {
    pub node_count: f64,
    pub max_depth: f64,
    pub fanout_peak: f64,
    pub fanin_peak: f64,
    pub edge_count: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            node_count: 1.0,
            max_depth: 5.0,
            fanout_peak: 2.0,
            fanin_peak: 2.0,
            edge_count: 0.5,
        }
    }
}

/// Complexity budget. A limit of 0 means unset.
///
/// Hard limits fail compilation; soft limits only warn.
#[derive(Clone, Copy, Debug)]
pub struct ComplexityBudget {
    pub node_count_hard: i64,
    pub max_depth_hard: i64,
    pub fanout_peak_hard: i64,
    pub fanin_peak_hard: i64,
    pub edge_count_soft: i64,
    pub complexity_score_soft: i64,
    pub score_weights: ScoreWeights,
}

impl Default for ComplexityBudget {
    fn default() -> Self {
        Self {
            node_count_hard: 2000,
            max_depth_hard: 120,
            fanout_peak_hard: 16,
            fanin_peak_hard: 16,
            edge_count_soft: 10_000,
            complexity_score_soft: 8000,
            score_weights: ScoreWeights::default(),
        }
    }
}

/// On-disk budget shape; missing fields keep defaults.
#[derive(Default, serde::Deserialize)]
struct BudgetFile {
    #[serde(default)]
    hard: HardLimits,
    #[serde(default)]
    soft: SoftLimits,
    #[serde(default)]
    score_weights: WeightOverrides,
}

#[derive(Default, serde::Deserialize)]
struct HardLimits {
    node_count: Option<i64>,
    max_depth: Option<i64>,
    fanout_peak: Option<i64>,
    fanin_peak: Option<i64>,
}

#[derive(Default, serde::Deserialize)]
struct SoftLimits {
    edge_count: Option<i64>,
    complexity_score: Option<i64>,
}

#[derive(Default, serde::Deserialize)]
struct WeightOverrides {
    node_count: Option<f64>,
    max_depth: Option<f64>,
    fanout_peak: Option<f64>,
    fanin_peak: Option<f64>,
    edge_count: Option<f64>,
}

impl ComplexityBudget {
    /// A budget with every limit unset; never rejects or warns.
    pub fn unlimited() -> Self {
        Self {
            node_count_hard: 0,
            max_depth_hard: 0,
            fanout_peak_hard: 0,
            fanin_peak_hard: 0,
            edge_count_soft: 0,
            complexity_score_soft: 0,
            score_weights: ScoreWeights::default(),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> error_stack::Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .into_report()
            .change_context_lazy(|| Error::ReadBudget(path.display().to_string()))?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(json: &str) -> error_stack::Result<Self, Error> {
        let file: BudgetFile = serde_json::from_str(json)
            .into_report()
            .change_context(Error::BudgetParse)?;
        let mut budget = Self::default();
        if let Some(value) = file.hard.node_count {
            budget.node_count_hard = value;
        }
        if let Some(value) = file.hard.max_depth {
            budget.max_depth_hard = value;
        }
        if let Some(value) = file.hard.fanout_peak {
            budget.fanout_peak_hard = value;
        }
        if let Some(value) = file.hard.fanin_peak {
            budget.fanin_peak_hard = value;
        }
        if let Some(value) = file.soft.edge_count {
            budget.edge_count_soft = value;
        }
        if let Some(value) = file.soft.complexity_score {
            budget.complexity_score_soft = value;
        }
        if let Some(value) = file.score_weights.node_count {
            budget.score_weights.node_count = value;
        }
        if let Some(value) = file.score_weights.max_depth {
            budget.score_weights.max_depth = value;
        }
        if let Some(value) = file.score_weights.fanout_peak {
            budget.score_weights.fanout_peak = value;
        }
        if let Some(value) = file.score_weights.fanin_peak {
            budget.score_weights.fanin_peak = value;
        }
        if let Some(value) = file.score_weights.edge_count {
            budget.score_weights.edge_count = value;
        }
        Ok(budget)
    }
}

/// The weighted scalar complexity score.
pub fn complexity_score(metrics: &ComplexityMetrics, weights: &ScoreWeights) -> i64 {
    (weights.node_count * metrics.node_count as f64
        + weights.max_depth * metrics.max_depth as f64
        + weights.fanout_peak * metrics.fanout_peak as f64
        + weights.fanin_peak * metrics.fanin_peak as f64
        + weights.edge_count * metrics.edge_count as f64) as i64
}

/// Compute the structural metrics of a plan.
///
/// Depth is the longest path length in node count, computed with Kahn's
/// traversal carrying `depth = 1 + max(predecessor depth)`; back-pointers
/// reconstruct one longest path. Edges referencing undeclared ids are
/// ignored here -- the compiler's topo phase rejects them first.
pub fn compute_metrics(plan: &Plan) -> ComplexityMetrics {
    let mut metrics = ComplexityMetrics {
        node_count: plan.nodes.len() as i64,
        ..ComplexityMetrics::default()
    };
    if plan.nodes.is_empty() {
        return metrics;
    }

    let index_of: HashMap<&str, NodeIdx> = plan
        .nodes
        .iter()
        .enumerate()
        .map(|(index, node)| (node.id.as_str(), NodeIdx::from_usize(index)))
        .collect();

    // node -> dependents, plus degrees.
    let mut dependents: IndexVec<NodeIdx, Vec<NodeIdx>> =
        IndexVec::from_vec(vec![Vec::new(); plan.nodes.len()]);
    let mut in_degree: IndexVec<NodeIdx, i64> =
        IndexVec::from_vec(vec![0; plan.nodes.len()]);
    for (index, node) in plan.nodes.iter().enumerate() {
        let target = NodeIdx::from_usize(index);
        for input in &node.inputs {
            if let Some(&source) = index_of.get(input.as_str()) {
                dependents[source].push(target);
                in_degree[target] += 1;
                metrics.edge_count += 1;
            }
        }
    }

    metrics.fanout_peak = dependents.iter().map(|deps| deps.len() as i64).max().unwrap_or(0);
    metrics.fanin_peak = in_degree.iter().copied().max().unwrap_or(0);

    // Kahn's traversal carrying per-node depth and back-pointers.
    let mut depth: IndexVec<NodeIdx, i64> = IndexVec::from_vec(vec![1; plan.nodes.len()]);
    let mut predecessor: IndexVec<NodeIdx, Option<NodeIdx>> =
        IndexVec::from_vec(vec![None; plan.nodes.len()]);
    let mut remaining = in_degree.clone();
    let mut queue: std::collections::VecDeque<NodeIdx> = remaining
        .iter_enumerated()
        .filter(|(_, &degree)| degree == 0)
        .map(|(index, _)| index)
        .collect();

    let mut deepest: Option<NodeIdx> = None;
    while let Some(current) = queue.pop_front() {
        if deepest.map(|best| depth[current] > depth[best]).unwrap_or(true) {
            deepest = Some(current);
        }
        for &dependent in &dependents[current] {
            if depth[current] + 1 > depth[dependent] {
                depth[dependent] = depth[current] + 1;
                predecessor[dependent] = Some(current);
            }
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if let Some(deepest) = deepest {
        metrics.max_depth = depth[deepest];
        let mut path = Vec::new();
        let mut current = Some(deepest);
        while let Some(index) = current {
            path.push(plan.nodes[index.index()].id.clone());
            current = predecessor[index];
        }
        path.reverse();
        metrics.longest_path = path;
    }

    metrics.top_fanout = top_degrees(plan, |index| dependents[index].len() as i64);
    metrics.top_fanin = top_degrees(plan, |index| in_degree[index]);

    metrics
}

fn top_degrees(plan: &Plan, degree: impl Fn(NodeIdx) -> i64) -> Vec<DegreeInfo> {
    plan.nodes
        .iter()
        .enumerate()
        .map(|(index, node)| DegreeInfo {
            id: node.id.clone(),
            op: node.op.clone(),
            degree: degree(NodeIdx::from_usize(index)),
        })
        .sorted_by(|a, b| b.degree.cmp(&a.degree))
        .take(TOP_K)
        .collect()
}

/// Check metrics against a budget.
///
/// Hard breaches produce `Err(PlanTooComplex)` with full diagnostics; soft
/// breaches come back as warnings for the caller to report.
pub fn check_budget(
    metrics: &ComplexityMetrics,
    budget: &ComplexityBudget,
) -> error_stack::Result<Vec<String>, Error> {
    let mut violated = false;
    let hard = [
        ("node_count", metrics.node_count, budget.node_count_hard),
        ("max_depth", metrics.max_depth, budget.max_depth_hard),
        ("fanout_peak", metrics.fanout_peak, budget.fanout_peak_hard),
        ("fanin_peak", metrics.fanin_peak, budget.fanin_peak_hard),
    ];
    for (_, value, limit) in hard {
        if limit > 0 && value > limit {
            violated = true;
        }
    }

    let mut warnings = Vec::new();
    if budget.edge_count_soft > 0 && metrics.edge_count > budget.edge_count_soft {
        warnings.push(format!(
            "edge_count={} (soft_limit={})",
            metrics.edge_count, budget.edge_count_soft
        ));
    }
    if budget.complexity_score_soft > 0 {
        let score = complexity_score(metrics, &budget.score_weights);
        if score > budget.complexity_score_soft {
            warnings.push(format!(
                "complexity_score={score} (soft_limit={})",
                budget.complexity_score_soft
            ));
        }
    }

    if violated {
        error_stack::bail!(Error::PlanTooComplex(format_diagnostics(metrics, budget)));
    }
    Ok(warnings)
}

/// Render the PLAN_TOO_COMPLEX diagnostics: every metric with its limit,
/// the top offenders, the (elided) longest path, and the remediation hint.
fn format_diagnostics(metrics: &ComplexityMetrics, budget: &ComplexityBudget) -> String {
    use std::fmt::Write;

    let mut out = String::from("PLAN_TOO_COMPLEX:\n");
    let line = |out: &mut String, name: &str, value: i64, limit: i64, kind: &str| {
        let _ = write!(out, "  {name}={value}");
        if limit > 0 {
            let _ = write!(out, " ({kind}_limit={limit})");
        }
        out.push('\n');
    };
    line(&mut out, "node_count", metrics.node_count, budget.node_count_hard, "hard");
    line(&mut out, "edge_count", metrics.edge_count, budget.edge_count_soft, "soft");
    line(&mut out, "max_depth", metrics.max_depth, budget.max_depth_hard, "hard");
    line(&mut out, "fanout_peak", metrics.fanout_peak, budget.fanout_peak_hard, "hard");
    line(&mut out, "fanin_peak", metrics.fanin_peak, budget.fanin_peak_hard, "hard");

    if metrics.top_fanout.iter().any(|info| info.degree > 0) {
        out.push_str("Top fanout nodes:\n");
        for info in metrics.top_fanout.iter().filter(|info| info.degree > 0) {
            let _ = writeln!(out, "  {} {} fanout={}", info.id, info.op, info.degree);
        }
    }
    if metrics.top_fanin.iter().any(|info| info.degree > 0) {
        out.push_str("Top fanin nodes:\n");
        for info in metrics.top_fanin.iter().filter(|info| info.degree > 0) {
            let _ = writeln!(out, "  {} {} fanin={}", info.id, info.op, info.degree);
        }
    }

    if !metrics.longest_path.is_empty() {
        let _ = writeln!(out, "Longest path (len={}):", metrics.longest_path.len());
        out.push_str("  ");
        if metrics.longest_path.len() > PATH_PREFIX + 1 {
            let prefix = metrics.longest_path[..PATH_PREFIX].join(" -> ");
            let last = metrics.longest_path.last().expect("path is non-empty");
            let _ = write!(out, "{prefix} -> ... -> {last}");
        } else {
            out.push_str(&metrics.longest_path.join(" -> "));
        }
        out.push('\n');
    }

    out.push_str("Hint:\n");
    out.push_str(
        "  Collapse repeated logic into 1-3 guest-module nodes, or request a core operator.\n",
    );
    out.push_str("  See docs/complexity-governance.md for guidance.");
    out
}

#[cfg(test)]
mod tests {
    use crate::PlanNode;

    use super::*;

    fn node(id: &str, inputs: &[&str]) -> PlanNode {
        PlanNode {
            id: id.to_owned(),
            op: "core:features".to_owned(),
            inputs: inputs.iter().map(|s| (*s).to_owned()).collect(),
            params: serde_json::json!({}),
            trace_key: None,
        }
    }

    fn plan(nodes: Vec<PlanNode>) -> Plan {
        Plan {
            name: "test".to_owned(),
            version: 1,
            meta: crate::PlanMeta::default(),
            nodes,
            logging: None,
        }
    }

    #[test]
    fn test_single_node_depth() {
        let metrics = compute_metrics(&plan(vec![node("a", &[])]));
        assert_eq!(metrics.node_count, 1);
        assert_eq!(metrics.max_depth, 1);
        assert_eq!(metrics.edge_count, 0);
        assert_eq!(metrics.longest_path, vec!["a"]);
    }

    #[test]
    fn test_chain_depth() {
        let nodes = vec![
            node("a", &[]),
            node("b", &["a"]),
            node("c", &["b"]),
            node("d", &["c"]),
        ];
        let metrics = compute_metrics(&plan(nodes));
        assert_eq!(metrics.max_depth, 4);
        assert_eq!(metrics.edge_count, 3);
        assert_eq!(metrics.longest_path, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_fan_metrics() {
        // One source feeding three nodes, all feeding one sink.
        let nodes = vec![
            node("src", &[]),
            node("f1", &["src"]),
            node("f2", &["src"]),
            node("f3", &["src"]),
            node("sink", &["f1", "f2", "f3"]),
        ];
        let metrics = compute_metrics(&plan(nodes));
        assert_eq!(metrics.fanout_peak, 3);
        assert_eq!(metrics.fanin_peak, 3);
        assert_eq!(metrics.max_depth, 3);
        assert_eq!(metrics.top_fanout[0].id, "src");
        assert_eq!(metrics.top_fanout[0].degree, 3);
        assert_eq!(metrics.top_fanin[0].id, "sink");
    }

    #[test]
    fn test_zero_budget_never_rejects() {
        let nodes = (0..50)
            .map(|i| {
                if i == 0 {
                    node("n0", &[])
                } else {
                    node(&format!("n{i}"), &[&format!("n{}", i - 1)])
                }
            })
            .collect();
        let metrics = compute_metrics(&plan(nodes));
        let warnings = check_budget(&metrics, &ComplexityBudget::unlimited()).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_hard_limit_rejects_with_diagnostics() {
        let mut nodes = vec![node("src", &[])];
        for i in 0..20 {
            nodes.push(node(&format!("f{i}"), &["src"]));
        }
        let metrics = compute_metrics(&plan(nodes));
        assert_eq!(metrics.fanout_peak, 20);

        let err = check_budget(&metrics, &ComplexityBudget::default()).unwrap_err();
        let Error::PlanTooComplex(diagnostics) = err.current_context() else {
            panic!("expected PlanTooComplex");
        };
        assert!(diagnostics.contains("fanout_peak=20"));
        assert!(diagnostics.contains("hard_limit=16"));
        assert!(diagnostics.contains("src core:features fanout=20"));
        assert!(diagnostics.contains("Hint:"));
    }

    #[test]
    fn test_soft_limit_warns() {
        let nodes = vec![node("a", &[]), node("b", &["a"])];
        let metrics = compute_metrics(&plan(nodes));
        let budget = ComplexityBudget {
            edge_count_soft: 0,
            complexity_score_soft: 1,
            ..ComplexityBudget::unlimited()
        };
        let warnings = check_budget(&metrics, &budget).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("complexity_score"));
    }

    #[test]
    fn test_longest_path_elided() {
        let nodes: Vec<PlanNode> = (0..10)
            .map(|i| {
                if i == 0 {
                    node("n0", &[])
                } else {
                    node(&format!("n{i}"), &[&format!("n{}", i - 1)])
                }
            })
            .collect();
        let metrics = compute_metrics(&plan(nodes));
        let budget = ComplexityBudget {
            max_depth_hard: 2,
            ..ComplexityBudget::unlimited()
        };
        let err = check_budget(&metrics, &budget).unwrap_err();
        let Error::PlanTooComplex(diagnostics) = err.current_context() else {
            panic!("expected PlanTooComplex");
        };
        assert!(diagnostics.contains("n0 -> n1 -> n2 -> n3 -> n4 -> ... -> n9"));
    }

    #[test]
    fn test_budget_file_overrides() {
        let budget = ComplexityBudget::from_json_str(
            r#"{
              "hard": {"fanout_peak": 20},
              "soft": {"edge_count": 50},
              "score_weights": {"max_depth": 10.0}
            }"#,
        )
        .unwrap();
        assert_eq!(budget.fanout_peak_hard, 20);
        assert_eq!(budget.edge_count_soft, 50);
        assert_eq!(budget.score_weights.max_depth, 10.0);
        // Untouched fields keep defaults.
        assert_eq!(budget.node_count_hard, 2000);
        assert_eq!(budget.complexity_score_soft, 8000);
        assert_eq!(budget.score_weights.node_count, 1.0);
    }

    #[test]
    fn test_complexity_score() {
        let metrics = ComplexityMetrics {
            node_count: 10,
            edge_count: 8,
            max_depth: 4,
            fanout_peak: 2,
            fanin_peak: 3,
            ..ComplexityMetrics::default()
        };
        // 1*10 + 5*4 + 2*2 + 2*3 + 0.5*8 = 44
        assert_eq!(complexity_score(&metrics, &ScoreWeights::default()), 44);
    }
}
