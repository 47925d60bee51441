use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use conduit_functions::FunctionRegistry;
use conduit_types::{resolve_map, GlobalState, Result};

use crate::config::{StepAction, StepConfig, StepKind};
use crate::evaluator::{action_mismatch, StepEvaluator};

// ---------------------------------------------------------------------------
// CustomFnEvaluator — dispatch to the custom function registry
// ---------------------------------------------------------------------------

/// Resolves the step's parameters against the current state and invokes the
/// named function from the registry with them and the step's fixed arguments.
pub struct CustomFnEvaluator {
    functions: Arc<FunctionRegistry>,
}

impl CustomFnEvaluator {
    pub fn new(functions: Arc<FunctionRegistry>) -> Self {
        Self { functions }
    }
}

#[async_trait]
impl StepEvaluator for CustomFnEvaluator {
    fn kind(&self) -> StepKind {
        StepKind::CustomFn
    }

    async fn evaluate(
        &self,
        _input: &Value,
        step: &StepConfig,
        step_name: &str,
        state: &GlobalState,
    ) -> Result<Value> {
        let StepAction::CustomFn(cfg) = &step.action else {
            return Err(action_mismatch("customfn", step_name));
        };

        let params = resolve_map(&cfg.parameters, state)?;
        tracing::debug!(step = %step_name, function = %cfg.function, "Invoking custom function");
        self.functions.call(&cfg.function, &params, &cfg.args)
    }
}
