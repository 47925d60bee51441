//! Step evaluator trait, dynamic dispatch wrapper, and evaluator registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use conduit_functions::FunctionRegistry;
use conduit_http::HttpInvoker;
use conduit_types::{ConduitError, GlobalState, Result};

use crate::config::{StepConfig, StepKind};

// ---------------------------------------------------------------------------
// StepEvaluator trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait StepEvaluator: Send + Sync {
    /// The step kind this evaluator handles.
    fn kind(&self) -> StepKind;

    /// Evaluate one step against its resolved input and the current state.
    async fn evaluate(
        &self,
        input: &Value,
        step: &StepConfig,
        step_name: &str,
        state: &GlobalState,
    ) -> Result<Value>;
}

/// Error for a step whose action body does not match the dispatched
/// evaluator. Reachable only through a registry miswired by hand.
pub(crate) fn action_mismatch(evaluator: &str, step: &str) -> ConduitError {
    ConduitError::Evaluator {
        evaluator: evaluator.into(),
        step: step.into(),
        message: "step action does not match evaluator kind".into(),
    }
}

// ---------------------------------------------------------------------------
// DynEvaluator — object-safe wrapper
// ---------------------------------------------------------------------------

pub struct DynEvaluator(Box<dyn StepEvaluator>);

impl DynEvaluator {
    pub fn new(evaluator: impl StepEvaluator + 'static) -> Self {
        Self(Box::new(evaluator))
    }

    pub fn kind(&self) -> StepKind {
        self.0.kind()
    }

    pub async fn evaluate(
        &self,
        input: &Value,
        step: &StepConfig,
        step_name: &str,
        state: &GlobalState,
    ) -> Result<Value> {
        self.0.evaluate(input, step, step_name, state).await
    }
}

// ---------------------------------------------------------------------------
// EvaluatorRegistry
// ---------------------------------------------------------------------------

pub struct EvaluatorRegistry {
    evaluators: HashMap<StepKind, DynEvaluator>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self {
            evaluators: HashMap::new(),
        }
    }

    pub fn register(&mut self, evaluator: impl StepEvaluator + 'static) {
        let kind = evaluator.kind();
        self.evaluators.insert(kind, DynEvaluator::new(evaluator));
    }

    pub fn get(&self, kind: StepKind) -> Option<&DynEvaluator> {
        self.evaluators.get(&kind)
    }

    pub fn has(&self, kind: StepKind) -> bool {
        self.evaluators.contains_key(&kind)
    }
}

impl Default for EvaluatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Registry factories
// ---------------------------------------------------------------------------

/// Registry with all six built-in evaluators wired to the given function
/// registry and HTTP invoker.
pub fn registry_with(
    functions: Arc<FunctionRegistry>,
    invoker: Arc<HttpInvoker>,
) -> EvaluatorRegistry {
    let mut reg = EvaluatorRegistry::new();
    reg.register(crate::evaluators::PathEvaluator);
    reg.register(crate::evaluators::TemplateEvaluator);
    reg.register(crate::evaluators::ExpressionEvaluator);
    reg.register(crate::evaluators::UrlBuildEvaluator);
    reg.register(crate::evaluators::CustomFnEvaluator::new(functions));
    reg.register(crate::evaluators::HttpInvokeEvaluator::new(invoker));
    reg
}

/// Registry with the built-in evaluators, built-in functions, and a fresh
/// HTTP client.
pub fn default_registry() -> EvaluatorRegistry {
    registry_with(
        Arc::new(FunctionRegistry::builtin()),
        Arc::new(HttpInvoker::new()),
    )
}
