use async_trait::async_trait;
use serde_json::Value;

use conduit_types::{ConduitError, GlobalState, Result};

use crate::config::{StepAction, StepConfig, StepKind};
use crate::evaluator::{action_mismatch, StepEvaluator};

// ---------------------------------------------------------------------------
// TemplateEvaluator — render a template against the step input
// ---------------------------------------------------------------------------

/// Loads the template source, renders it against the step input, and parses
/// the rendered text as JSON. Text that is not valid JSON is returned as a
/// raw string rather than failing the step.
pub struct TemplateEvaluator;

#[async_trait]
impl StepEvaluator for TemplateEvaluator {
    fn kind(&self) -> StepKind {
        StepKind::Template
    }

    async fn evaluate(
        &self,
        input: &Value,
        step: &StepConfig,
        step_name: &str,
        _state: &GlobalState,
    ) -> Result<Value> {
        let StepAction::Template(cfg) = &step.action else {
            return Err(action_mismatch("template", step_name));
        };

        let source = cfg.template.load()?;
        let context = render_context(input)?;
        let rendered = tera::Tera::one_off(&source, &context, false)
            .map_err(|e| ConduitError::Template(format!("render failed: {e}")))?;

        match serde_json::from_str::<Value>(&rendered) {
            Ok(parsed) => Ok(parsed),
            Err(_) => Ok(Value::String(rendered)),
        }
    }
}

/// Object inputs become the render context directly; any other input is
/// exposed under a `value` binding.
fn render_context(input: &Value) -> Result<tera::Context> {
    match input {
        Value::Object(_) => tera::Context::from_value(input.clone())
            .map_err(|e| ConduitError::Template(format!("invalid context: {e}"))),
        other => {
            let mut context = tera::Context::new();
            context.insert("value", other);
            Ok(context)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn inline_step(content: Value) -> StepConfig {
        serde_json::from_value(json!({
            "type": "template",
            "template": {"type": "string", "content": content}
        }))
        .unwrap()
    }

    async fn render(step: StepConfig, input: Value) -> Result<Value> {
        TemplateEvaluator
            .evaluate(&input, &step, "render", &GlobalState::new())
            .await
    }

    #[tokio::test]
    async fn rendered_json_is_parsed() {
        let step = inline_step(json!(r#"{"id": {{ user.id }}}"#));
        let out = render(step, json!({"user": {"id": 7}})).await.unwrap();
        assert_eq!(out, json!({"id": 7}));
    }

    #[tokio::test]
    async fn rendered_non_json_stays_a_string() {
        let step = inline_step(json!("hello {{ name }}"));
        let out = render(step, json!({"name": "world"})).await.unwrap();
        assert_eq!(out, json!("hello world"));
    }

    #[tokio::test]
    async fn line_array_sources_are_joined() {
        let step = inline_step(json!(["{", "  \"n\": {{ n }}", "}"]));
        let out = render(step, json!({"n": 3})).await.unwrap();
        assert_eq!(out, json!({"n": 3}));
    }

    #[tokio::test]
    async fn non_object_input_binds_as_value() {
        let step = inline_step(json!("got {{ value }}"));
        let out = render(step, json!(42)).await.unwrap();
        assert_eq!(out, json!("got 42"));
    }

    #[tokio::test]
    async fn file_source_renders() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"doubled": {{{{ n }}}}}}"#).unwrap();
        let step: StepConfig = serde_json::from_value(json!({
            "type": "template",
            "template": {"type": "file", "path": file.path()}
        }))
        .unwrap();
        let out = render(step, json!({"n": 8})).await.unwrap();
        assert_eq!(out, json!({"doubled": 8}));
    }

    #[tokio::test]
    async fn missing_file_is_fatal_with_path() {
        let step: StepConfig = serde_json::from_value(json!({
            "type": "template",
            "template": {"type": "file", "path": "/no/such/template.tpl"}
        }))
        .unwrap();
        let err = render(step, json!({})).await.unwrap_err();
        assert!(matches!(err, ConduitError::TemplateLoad { .. }));
        assert!(err.to_string().contains("/no/such/template.tpl"));
    }

    #[tokio::test]
    async fn render_error_is_fatal() {
        let step = inline_step(json!("{{ missing.deep.field }}"));
        let err = render(step, json!({})).await.unwrap_err();
        assert!(matches!(err, ConduitError::Template(_)));
    }
}
