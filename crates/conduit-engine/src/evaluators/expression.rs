use async_trait::async_trait;
use serde_json::Value;

use conduit_types::{ConduitError, GlobalState, Result};

use crate::config::{StepAction, StepConfig, StepKind};
use crate::evaluator::{action_mismatch, StepEvaluator};

// ---------------------------------------------------------------------------
// ExpressionEvaluator — functional query over the step input
// ---------------------------------------------------------------------------

pub struct ExpressionEvaluator;

#[async_trait]
impl StepEvaluator for ExpressionEvaluator {
    fn kind(&self) -> StepKind {
        StepKind::Expression
    }

    async fn evaluate(
        &self,
        input: &Value,
        step: &StepConfig,
        step_name: &str,
        _state: &GlobalState,
    ) -> Result<Value> {
        let StepAction::Expression(cfg) = &step.action else {
            return Err(action_mismatch("expression", step_name));
        };
        evaluate_expression(&cfg.expression, input)
    }
}

/// Compile `expression` and evaluate it against `doc`.
pub(crate) fn evaluate_expression(expression: &str, doc: &Value) -> Result<Value> {
    let compiled = jmespath::compile(expression).map_err(|e| {
        ConduitError::Expression(format!("failed to compile '{expression}': {e}"))
    })?;
    let result = compiled.search(doc.clone()).map_err(|e| {
        ConduitError::Expression(format!("failed to evaluate '{expression}': {e}"))
    })?;
    serde_json::to_value(result.as_ref()).map_err(Into::into)
}
