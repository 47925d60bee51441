use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use conduit_http::HttpInvoker;
use conduit_types::{GlobalState, Result};

use crate::config::{StepAction, StepConfig, StepKind};
use crate::evaluator::{action_mismatch, StepEvaluator};

// ---------------------------------------------------------------------------
// HttpInvokeEvaluator — delegate to the HTTP invoker adapter
// ---------------------------------------------------------------------------

/// Performs the step's HTTP call through the invoker. Request parts resolve
/// against the accumulated state, not the step input; failures come back as
/// structured values and do not abort the run.
pub struct HttpInvokeEvaluator {
    invoker: Arc<HttpInvoker>,
}

impl HttpInvokeEvaluator {
    pub fn new(invoker: Arc<HttpInvoker>) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl StepEvaluator for HttpInvokeEvaluator {
    fn kind(&self) -> StepKind {
        StepKind::HttpInvoke
    }

    async fn evaluate(
        &self,
        _input: &Value,
        step: &StepConfig,
        step_name: &str,
        state: &GlobalState,
    ) -> Result<Value> {
        let StepAction::HttpInvoke(cfg) = &step.action else {
            return Err(action_mismatch("httpinvoke", step_name));
        };
        self.invoker.invoke(cfg, step_name, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn transport_failure_becomes_step_output() {
        let evaluator = HttpInvokeEvaluator::new(Arc::new(HttpInvoker::new()));
        let step: StepConfig = serde_json::from_value(json!({
            "type": "httpinvoke",
            "method": "GET",
            "url": "http://127.0.0.1:9",
            "options": {"timeout": 500}
        }))
        .unwrap();
        let out = evaluator
            .evaluate(&json!(null), &step, "call", &GlobalState::new())
            .await
            .unwrap();
        assert_eq!(out["error"]["kind"], json!("request"));
    }
}
