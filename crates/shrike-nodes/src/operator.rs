use shrike_batch::ColumnBatch;
use shrike_core::KeyRegistry;

use crate::{Error, ModulePolicy};

/// Per-invocation context handed to every operator.
///
/// Everything here is read-only and shared; operators keep no state across
/// invocations.
pub struct ExecContext<'a> {
    pub registry: &'a KeyRegistry,
    /// Policy gating guest-module IO. `None` denies all module IO.
    pub policy: Option<&'a ModulePolicy>,
}

impl<'a> ExecContext<'a> {
    pub fn new(registry: &'a KeyRegistry) -> Self {
        Self {
            registry,
            policy: None,
        }
    }

    pub fn with_policy(mut self, policy: &'a ModulePolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

/// A pipeline stage.
///
/// Operators must be deterministic given inputs, params, and registry, and
/// never mutate their input -- output batches share unchanged columns with
/// the input by handle.
pub trait Operator: Send + Sync {
    fn run(
        &self,
        ctx: &ExecContext<'_>,
        input: &ColumnBatch,
        params: &serde_json::Value,
    ) -> error_stack::Result<ColumnBatch, Error>;
}
