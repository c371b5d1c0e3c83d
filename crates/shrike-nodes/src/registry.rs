use hashbrown::HashMap;
use itertools::Itertools;

use crate::{NodeSpec, Operator};

/// Type alias for a function used to create an [`Operator`].
pub type OperatorFactoryFn = dyn Fn() -> Box<dyn Operator> + Send + Sync;

/// Factory for creating operators with a specific op name, plus the static
/// metadata exported for tooling.
pub struct OperatorFactory {
    pub spec: NodeSpec,
    pub create: &'static OperatorFactoryFn,
}

inventory::collect!(OperatorFactory);

/// Registry of operator factories keyed by op name.
///
/// The process-wide instance is built lazily from inventory submissions;
/// tests construct their own instances and pass them explicitly.
pub struct OperatorRegistry {
    by_op: HashMap<&'static str, &'static OperatorFactory>,
}

impl OperatorRegistry {
    /// Build a registry from every inventory-submitted factory.
    pub fn from_inventory() -> Self {
        let by_op: HashMap<_, _> = inventory::iter::<OperatorFactory>()
            .map(|factory| (factory.spec.op, factory))
            .collect();

        debug_assert_eq!(
            by_op.len(),
            inventory::iter::<OperatorFactory>().count(),
            "expected every operator to appear in the registry map; duplicates: {:?}",
            inventory::iter::<OperatorFactory>()
                .map(|factory| factory.spec.op)
                .duplicates()
                .collect::<Vec<_>>()
        );
        Self { by_op }
    }

    /// Build a registry from an explicit factory list (test hook).
    pub fn from_factories(
        factories: impl IntoIterator<Item = &'static OperatorFactory>,
    ) -> Self {
        Self {
            by_op: factories
                .into_iter()
                .map(|factory| (factory.spec.op, factory))
                .collect(),
        }
    }

    pub fn has_op(&self, op: &str) -> bool {
        self.by_op.contains_key(op)
    }

    pub fn get(&self, op: &str) -> Option<&'static OperatorFactory> {
        self.by_op.get(op).copied()
    }

    /// All registered specs, sorted by op name for deterministic export.
    pub fn specs(&self) -> Vec<&'static NodeSpec> {
        self.by_op
            .values()
            .map(|factory| &factory.spec)
            .sorted_by_key(|spec| spec.op)
            .collect()
    }
}

// Lazy so it is built after inventory submissions are collected.
#[static_init::dynamic(lazy)]
static GLOBAL: OperatorRegistry = OperatorRegistry::from_inventory();

/// The process-wide operator registry.
pub fn global_registry() -> &'static OperatorRegistry {
    &GLOBAL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_operators_registered() {
        let registry = global_registry();
        for op in [
            "core:sourcer",
            "core:features",
            "core:model",
            "core:score_formula",
            "core:merge",
        ] {
            assert!(registry.has_op(op), "missing operator {op}");
        }
        assert!(!registry.has_op("core:unknown"));
    }

    #[test]
    fn test_specs_sorted() {
        let specs = global_registry().specs();
        let ops: Vec<_> = specs.iter().map(|spec| spec.op).collect();
        let mut sorted = ops.clone();
        sorted.sort_unstable();
        assert_eq!(ops, sorted);
    }
}
