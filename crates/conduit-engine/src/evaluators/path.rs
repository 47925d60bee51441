use async_trait::async_trait;
use serde_json::Value;

use conduit_types::{ConduitError, GlobalState, Result};

use crate::config::{StepAction, StepConfig, StepKind};
use crate::evaluator::{action_mismatch, StepEvaluator};

// ---------------------------------------------------------------------------
// PathEvaluator — extract values with a path expression
// ---------------------------------------------------------------------------

/// Runs a path expression against the step input: `query` yields the ordered
/// list of all matches, `value` yields the single first match and fails when
/// nothing matches.
pub struct PathEvaluator;

#[async_trait]
impl StepEvaluator for PathEvaluator {
    fn kind(&self) -> StepKind {
        StepKind::Path
    }

    async fn evaluate(
        &self,
        input: &Value,
        step: &StepConfig,
        step_name: &str,
        _state: &GlobalState,
    ) -> Result<Value> {
        let StepAction::Path(cfg) = &step.action else {
            return Err(action_mismatch("path", step_name));
        };

        match (&cfg.query, &cfg.value) {
            (Some(query), None) => {
                let path = parse_path(query)?;
                let matches: Vec<Value> = path.query(input).all().into_iter().cloned().collect();
                Ok(Value::Array(matches))
            }
            (None, Some(value)) => {
                let path = parse_path(value)?;
                path.query(input)
                    .first()
                    .cloned()
                    .ok_or_else(|| ConduitError::PathUnmatched {
                        expression: value.clone(),
                    })
            }
            (Some(_), Some(_)) => Err(ConduitError::StepConfig {
                step: step_name.into(),
                message: "both 'query' and 'value' declared; use exactly one".into(),
            }),
            (None, None) => Err(ConduitError::StepConfig {
                step: step_name.into(),
                message: "missing 'query' or 'value'".into(),
            }),
        }
    }
}

fn parse_path(expression: &str) -> Result<serde_json_path::JsonPath> {
    serde_json_path::JsonPath::parse(expression).map_err(|e| ConduitError::PathExpression {
        expression: expression.into(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(body: Value) -> StepConfig {
        let mut obj = json!({"type": "path"});
        obj.as_object_mut()
            .unwrap()
            .extend(body.as_object().unwrap().clone());
        serde_json::from_value(obj).unwrap()
    }

    async fn run(body: Value, input: Value) -> Result<Value> {
        PathEvaluator
            .evaluate(&input, &step(body), "extract", &GlobalState::new())
            .await
    }

    #[tokio::test]
    async fn query_mode_returns_all_matches() {
        let input = json!({"items": [{"id": 1}, {"id": 2}]});
        let out = run(json!({"query": "$.items[*].id"}), input).await.unwrap();
        assert_eq!(out, json!([1, 2]));
    }

    #[tokio::test]
    async fn query_mode_returns_empty_list_when_nothing_matches() {
        let out = run(json!({"query": "$.missing[*]"}), json!({"a": 1}))
            .await
            .unwrap();
        assert_eq!(out, json!([]));
    }

    #[tokio::test]
    async fn value_mode_returns_first_match() {
        let out = run(json!({"value": "$.user.id"}), json!({"user": {"id": 7}}))
            .await
            .unwrap();
        assert_eq!(out, json!(7));
    }

    #[tokio::test]
    async fn value_mode_fails_when_nothing_matches() {
        let err = run(json!({"value": "$.user.id"}), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ConduitError::PathUnmatched { .. }));
    }

    #[tokio::test]
    async fn neither_field_is_a_config_error() {
        let err = run(json!({}), json!({})).await.unwrap_err();
        assert!(matches!(err, ConduitError::StepConfig { .. }));
    }

    #[tokio::test]
    async fn both_fields_is_a_config_error() {
        let err = run(json!({"query": "$.a", "value": "$.b"}), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ConduitError::StepConfig { .. }));
    }

    #[tokio::test]
    async fn invalid_expression_is_reported() {
        let err = run(json!({"value": "$.["}), json!({})).await.unwrap_err();
        assert!(matches!(err, ConduitError::PathExpression { .. }));
    }
}
