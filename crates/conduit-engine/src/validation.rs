//! Configuration validation: lint rules and diagnostics.
//!
//! Checks a [`PipelineConfig`] before any step executes. Call [`validate`]
//! for advisory diagnostics or [`validate_or_raise`] to fail on the first
//! `Error`-severity issue.

use std::collections::HashSet;

use conduit_functions::FunctionRegistry;
use conduit_types::{ConduitError, Result};

use crate::config::{InputSelector, PipelineConfig, StepAction, TemplateSource};

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub step: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, config: &PipelineConfig, functions: &FunctionRegistry) -> Vec<Diagnostic>;
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct NonEmptyRule;
impl LintRule for NonEmptyRule {
    fn name(&self) -> &str {
        "non_empty"
    }
    fn apply(&self, config: &PipelineConfig, _functions: &FunctionRegistry) -> Vec<Diagnostic> {
        if config.steps.is_empty() {
            vec![Diagnostic {
                rule: self.name().into(),
                severity: Severity::Error,
                message: "Pipeline has no steps".into(),
                step: None,
            }]
        } else {
            vec![]
        }
    }
}

struct PathFieldsRule;
impl LintRule for PathFieldsRule {
    fn name(&self) -> &str {
        "path_fields"
    }
    fn apply(&self, config: &PipelineConfig, _functions: &FunctionRegistry) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for (i, step) in config.steps.iter().enumerate() {
            if let StepAction::Path(cfg) = &step.action {
                let message = match (&cfg.query, &cfg.value) {
                    (None, None) => Some("path step declares neither 'query' nor 'value'"),
                    (Some(_), Some(_)) => Some("path step declares both 'query' and 'value'"),
                    _ => None,
                };
                if let Some(message) = message {
                    out.push(Diagnostic {
                        rule: self.name().into(),
                        severity: Severity::Error,
                        message: message.into(),
                        step: Some(step.effective_name(i)),
                    });
                }
            }
        }
        out
    }
}

struct KnownFunctionRule;
impl LintRule for KnownFunctionRule {
    fn name(&self) -> &str {
        "known_function"
    }
    fn apply(&self, config: &PipelineConfig, functions: &FunctionRegistry) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for (i, step) in config.steps.iter().enumerate() {
            if let StepAction::CustomFn(cfg) = &step.action {
                if !functions.contains(&cfg.function) {
                    out.push(Diagnostic {
                        rule: self.name().into(),
                        severity: Severity::Error,
                        message: format!("unknown custom function '{}'", cfg.function),
                        step: Some(step.effective_name(i)),
                    });
                }
            }
        }
        out
    }
}

struct HttpMethodRule;
impl LintRule for HttpMethodRule {
    fn name(&self) -> &str {
        "http_method"
    }
    fn apply(&self, config: &PipelineConfig, _functions: &FunctionRegistry) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for (i, step) in config.steps.iter().enumerate() {
            if let StepAction::HttpInvoke(cfg) = &step.action {
                let valid = !cfg.method.is_empty()
                    && cfg
                        .method
                        .chars()
                        .all(|c| c.is_ascii_alphabetic());
                if !valid {
                    out.push(Diagnostic {
                        rule: self.name().into(),
                        severity: Severity::Error,
                        message: format!("invalid HTTP method '{}'", cfg.method),
                        step: Some(step.effective_name(i)),
                    });
                }
            }
        }
        out
    }
}

struct InputReferenceRule;
impl LintRule for InputReferenceRule {
    fn name(&self) -> &str {
        "input_reference"
    }
    fn apply(&self, config: &PipelineConfig, _functions: &FunctionRegistry) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        let mut produced: HashSet<String> = HashSet::new();
        for (i, step) in config.steps.iter().enumerate() {
            if let InputSelector::Named(key) = &step.input {
                if !produced.contains(key) {
                    out.push(Diagnostic {
                        rule: self.name().into(),
                        severity: Severity::Warning,
                        message: format!(
                            "input '{key}' is not produced by an earlier step; the original input will be used"
                        ),
                        step: Some(step.effective_name(i)),
                    });
                }
            }
            produced.insert(step.effective_name(i));
            produced.insert(step.effective_output_key(i));
        }
        out
    }
}

struct TemplateFileRule;
impl LintRule for TemplateFileRule {
    fn name(&self) -> &str {
        "template_file"
    }
    fn apply(&self, config: &PipelineConfig, _functions: &FunctionRegistry) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for (i, step) in config.steps.iter().enumerate() {
            if let StepAction::Template(cfg) = &step.action {
                if let TemplateSource::File { path } = &cfg.template {
                    if !path.exists() {
                        out.push(Diagnostic {
                            rule: self.name().into(),
                            severity: Severity::Warning,
                            message: format!("template file '{}' does not exist", path.display()),
                            step: Some(step.effective_name(i)),
                        });
                    }
                }
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

fn rules() -> Vec<Box<dyn LintRule>> {
    vec![
        Box::new(NonEmptyRule),
        Box::new(PathFieldsRule),
        Box::new(KnownFunctionRule),
        Box::new(HttpMethodRule),
        Box::new(InputReferenceRule),
        Box::new(TemplateFileRule),
    ]
}

/// Run every lint rule and collect the diagnostics.
pub fn validate(config: &PipelineConfig, functions: &FunctionRegistry) -> Vec<Diagnostic> {
    rules()
        .iter()
        .flat_map(|rule| rule.apply(config, functions))
        .collect()
}

/// Fail on the first `Error`-severity diagnostic.
pub fn validate_or_raise(config: &PipelineConfig, functions: &FunctionRegistry) -> Result<()> {
    let diagnostics = validate(config, functions);
    if let Some(first) = diagnostics
        .iter()
        .find(|d| d.severity == Severity::Error)
    {
        let location = first
            .step
            .as_deref()
            .map(|s| format!(" (step '{s}')"))
            .unwrap_or_default();
        return Err(ConduitError::Validation(format!(
            "{}{location}",
            first.message
        )));
    }
    for warning in &diagnostics {
        tracing::warn!(rule = %warning.rule, step = ?warning.step, "{}", warning.message);
    }
    Ok(())
}
