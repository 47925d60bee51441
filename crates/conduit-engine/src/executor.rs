//! Pipeline execution engine — the core step loop.
//!
//! Steps run strictly in order over a single-owner [`GlobalState`]. Each
//! iteration resolves the step's input per its input selector, dispatches
//! through the evaluator registry, and merges the result back into state
//! under the step's effective output key.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use conduit_functions::FunctionRegistry;
use conduit_http::HttpInvoker;
use conduit_types::{ConduitError, GlobalState, Result, StepRecord};

use crate::config::{InputSelector, OutputScope, PipelineConfig};
use crate::evaluator::{registry_with, EvaluatorRegistry};
use crate::validation::validate_or_raise;

// ---------------------------------------------------------------------------
// PipelineExecutor
// ---------------------------------------------------------------------------

/// The core pipeline executor. Owns an evaluator registry and drives the
/// step sequence. The executor itself is immutable: every run builds its own
/// state, so one executor can serve concurrent runs.
pub struct PipelineExecutor {
    registry: EvaluatorRegistry,
    functions: Arc<FunctionRegistry>,
}

impl PipelineExecutor {
    /// Create an executor with the given registry and function set.
    pub fn new(registry: EvaluatorRegistry, functions: Arc<FunctionRegistry>) -> Self {
        Self {
            registry,
            functions,
        }
    }

    /// Create an executor pre-loaded with the built-in evaluators, built-in
    /// functions, and a fresh HTTP client.
    pub fn with_default_registry() -> Self {
        let functions = Arc::new(FunctionRegistry::builtin());
        let registry = registry_with(functions.clone(), Arc::new(HttpInvoker::new()));
        Self {
            registry,
            functions,
        }
    }

    /// Run `config` over `input`, returning the final accumulated state.
    ///
    /// A fatal error at step `i` aborts the run: steps `i+1..` never execute
    /// and no partial state is returned.
    pub async fn run(&self, input: &Value, config: &PipelineConfig) -> Result<GlobalState> {
        validate_or_raise(config, &self.functions)?;

        let run_id = Uuid::new_v4();
        let mut state = GlobalState::new();
        let mut previous_key: Option<String> = None;

        for (index, step) in config.steps.iter().enumerate() {
            let step_name = step.effective_name(index);
            let output_key = step.effective_output_key(index);

            let step_input = match &step.input {
                InputSelector::Original => input.clone(),
                InputSelector::Previous => previous_key
                    .as_deref()
                    .and_then(|key| state.get(key))
                    .filter(|v| !v.is_null())
                    .cloned()
                    .unwrap_or_else(|| input.clone()),
                InputSelector::Named(key) => state
                    .get(key)
                    .filter(|v| !v.is_null())
                    .cloned()
                    .unwrap_or_else(|| input.clone()),
            };

            let kind = step.action.kind();
            let evaluator = self.registry.get(kind).ok_or_else(|| {
                ConduitError::UnknownEvaluator {
                    kind: kind.to_string(),
                }
            })?;

            tracing::debug!(run = %run_id, step = %step_name, index, kind = %kind, input = %step_input, "Step input resolved");
            let started_at = chrono::Utc::now();

            if step.output == OutputScope::Global {
                state.clear();
            }

            let output = evaluator
                .evaluate(&step_input, step, &step_name, &state)
                .await?;

            if config.diagnostics {
                let record = StepRecord {
                    index,
                    name: step_name.clone(),
                    started_at,
                    input: step_input,
                    output: output.clone(),
                };
                tracing::debug!(run = %run_id, record = ?record, "Step executed");
                state.set(&output_key, output.clone());
                state.set(&step_name, output);
            } else {
                tracing::debug!(run = %run_id, step = %step_name, key = %output_key, output = %output, "Step executed");
                state.set(&output_key, output);
            }

            previous_key = Some(output_key);
        }

        tracing::debug!(run = %run_id, state = %state.document(), "Pipeline complete");
        Ok(state)
    }
}
