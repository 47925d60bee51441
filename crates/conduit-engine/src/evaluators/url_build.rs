use async_trait::async_trait;
use serde_json::{Map, Value};
use url::Url;

use conduit_types::{ConduitError, GlobalState, Result};

use crate::config::{StepAction, StepConfig, StepKind, UrlSegment};
use crate::evaluator::{action_mismatch, StepEvaluator};
use crate::evaluators::evaluate_expression;

// ---------------------------------------------------------------------------
// UrlBuildEvaluator — assemble a URL from literals and expressions
// ---------------------------------------------------------------------------

/// Assembles `protocol://baseURL/path?query` from the step configuration.
/// Expression path segments are evaluated against the step input and dropped
/// when falsy; expression query parameters are evaluated and kept.
pub struct UrlBuildEvaluator;

#[async_trait]
impl StepEvaluator for UrlBuildEvaluator {
    fn kind(&self) -> StepKind {
        StepKind::UrlBuild
    }

    async fn evaluate(
        &self,
        input: &Value,
        step: &StepConfig,
        step_name: &str,
        _state: &GlobalState,
    ) -> Result<Value> {
        let StepAction::UrlBuild(cfg) = &step.action else {
            return Err(action_mismatch("urlbuild", step_name));
        };

        let path = build_path(&cfg.path, input)?;
        let query = build_query(&cfg.query_params, input, step_name)?;
        let protocol = cfg.protocol.as_deref().unwrap_or("http");

        let mut url = Url::parse(&format!("{protocol}://{}", cfg.base_url)).map_err(|e| {
            ConduitError::StepConfig {
                step: step_name.into(),
                message: format!("invalid base URL '{}': {e}", cfg.base_url),
            }
        })?;
        url.set_path(&path);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &query {
                pairs.append_pair(key, value);
            }
            drop(pairs);
        }

        tracing::debug!(step = %step_name, url = %url, "Built URL");
        Ok(Value::String(url.to_string()))
    }
}

fn build_path(segments: &[UrlSegment], doc: &Value) -> Result<String> {
    let mut parts = Vec::with_capacity(segments.len());
    for segment in segments {
        match segment {
            UrlSegment::Literal(text) => parts.push(text.clone()),
            UrlSegment::Expression { expression } => {
                let value = evaluate_expression(expression, doc)?;
                if is_truthy(&value) {
                    parts.push(string_form(&value));
                }
            }
        }
    }
    Ok(parts.join("/"))
}

fn build_query(
    params: &Map<String, Value>,
    doc: &Value,
    step_name: &str,
) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::with_capacity(params.len());
    for (key, value) in params {
        let rendered = match value {
            Value::String(literal) => literal.clone(),
            Value::Object(fields) => match fields.get("expression").and_then(Value::as_str) {
                Some(expression) => string_form(&evaluate_expression(expression, doc)?),
                None => {
                    return Err(ConduitError::StepConfig {
                        step: step_name.into(),
                        message: format!("query parameter '{key}' has no 'expression' field"),
                    })
                }
            },
            other => string_form(other),
        };
        pairs.push((key.clone(), rendered));
    }
    Ok(pairs)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
