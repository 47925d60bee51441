//! Pipeline configuration model.
//!
//! A pipeline is an ordered list of steps. Each step carries the common
//! routing fields (name, input selector, output scope, output key) plus a
//! type-specific action body selected by the `type` tag. The step-kind set
//! is closed: an unrecognized `type` fails at deserialization time.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use conduit_http::HttpStep;
use conduit_types::{ConduitError, Result};

// ---------------------------------------------------------------------------
// PipelineConfig / StepConfig
// ---------------------------------------------------------------------------

/// Top-level pipeline configuration. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub steps: Vec<StepConfig>,
    /// When set, every step's output is additionally stored under the step's
    /// declared name and step records are logged.
    #[serde(default)]
    pub diagnostics: bool,
}

impl PipelineConfig {
    pub fn from_json(source: &str) -> Result<Self> {
        serde_json::from_str(source).map_err(Into::into)
    }
}

/// One configured unit of transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub input: InputSelector,
    #[serde(default)]
    pub output: OutputScope,
    #[serde(rename = "outputKey", default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    #[serde(flatten)]
    pub action: StepAction,
}

impl StepConfig {
    /// Effective step name: the declared name or the positional default.
    pub fn effective_name(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("outputStep{index}"))
    }

    /// Effective output key: the declared key or the effective name.
    pub fn effective_output_key(&self, index: usize) -> String {
        self.output_key
            .clone()
            .unwrap_or_else(|| self.effective_name(index))
    }
}

/// Where a step reads its input from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSelector {
    /// The run's original input document.
    #[default]
    Original,
    /// The previous step's stored output.
    Previous,
    /// A named entry in the accumulated state.
    #[serde(untagged)]
    Named(String),
}

/// Output scoping for a step's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputScope {
    /// Merge into the accumulated state.
    #[default]
    Local,
    /// Clear the state first: the step's result becomes its sole content.
    Global,
}

// ---------------------------------------------------------------------------
// StepAction — the closed step-kind set
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepAction {
    Path(PathStep),
    Template(TemplateStep),
    Expression(ExpressionStep),
    #[serde(rename = "urlbuild")]
    UrlBuild(UrlBuildStep),
    #[serde(rename = "customfn")]
    CustomFn(CustomFnStep),
    #[serde(rename = "httpinvoke")]
    HttpInvoke(HttpStep),
}

impl StepAction {
    /// Registry key for this action.
    pub fn kind(&self) -> StepKind {
        match self {
            StepAction::Path(_) => StepKind::Path,
            StepAction::Template(_) => StepKind::Template,
            StepAction::Expression(_) => StepKind::Expression,
            StepAction::UrlBuild(_) => StepKind::UrlBuild,
            StepAction::CustomFn(_) => StepKind::CustomFn,
            StepAction::HttpInvoke(_) => StepKind::HttpInvoke,
        }
    }
}

/// Fieldless step-kind tags, used as evaluator registry keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Path,
    Template,
    Expression,
    UrlBuild,
    CustomFn,
    HttpInvoke,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Path => "path",
            StepKind::Template => "template",
            StepKind::Expression => "expression",
            StepKind::UrlBuild => "urlbuild",
            StepKind::CustomFn => "customfn",
            StepKind::HttpInvoke => "httpinvoke",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Step bodies
// ---------------------------------------------------------------------------

/// Path-extraction body: exactly one of `query` / `value` must be declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateStep {
    pub template: TemplateSource,
}

/// Where a template's source text comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TemplateSource {
    /// Inline source: a single string or an array of lines joined with `\n`.
    String { content: TemplateContent },
    /// Source loaded from a file at render time.
    File { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateContent {
    Single(String),
    Lines(Vec<String>),
}

impl TemplateSource {
    /// Load the template text. A file read failure is fatal and carries the
    /// offending path.
    pub fn load(&self) -> Result<String> {
        match self {
            TemplateSource::String { content } => Ok(match content {
                TemplateContent::Single(text) => text.clone(),
                TemplateContent::Lines(lines) => lines.join("\n"),
            }),
            TemplateSource::File { path } => {
                std::fs::read_to_string(path).map_err(|e| ConduitError::TemplateLoad {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionStep {
    pub expression: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlBuildStep {
    #[serde(rename = "baseURL")]
    pub base_url: String,
    #[serde(default)]
    pub path: Vec<UrlSegment>,
    #[serde(rename = "queryParams", default, skip_serializing_if = "Map::is_empty")]
    pub query_params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// A path segment: a literal, or an expression evaluated against the step
/// input (falsy results are dropped from the joined path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlSegment {
    Literal(String),
    Expression { expression: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFnStep {
    pub function: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_defaults() {
        let step: StepConfig = serde_json::from_value(json!({
            "type": "expression",
            "expression": "user.id"
        }))
        .unwrap();
        assert_eq!(step.input, InputSelector::Original);
        assert_eq!(step.output, OutputScope::Local);
        assert_eq!(step.effective_name(3), "outputStep3");
        assert_eq!(step.effective_output_key(3), "outputStep3");
    }

    #[test]
    fn declared_name_and_output_key_win() {
        let step: StepConfig = serde_json::from_value(json!({
            "type": "expression",
            "expression": "a",
            "name": "extract",
            "outputKey": "result"
        }))
        .unwrap();
        assert_eq!(step.effective_name(0), "extract");
        assert_eq!(step.effective_output_key(0), "result");
    }

    #[test]
    fn output_key_defaults_to_name() {
        let step: StepConfig = serde_json::from_value(json!({
            "type": "expression",
            "expression": "a",
            "name": "extract"
        }))
        .unwrap();
        assert_eq!(step.effective_output_key(5), "extract");
    }

    #[test]
    fn input_selector_named_variant() {
        let step: StepConfig = serde_json::from_value(json!({
            "type": "expression",
            "expression": "a",
            "input": "login"
        }))
        .unwrap();
        assert_eq!(step.input, InputSelector::Named("login".into()));

        let step: StepConfig = serde_json::from_value(json!({
            "type": "expression",
            "expression": "a",
            "input": "previous"
        }))
        .unwrap();
        assert_eq!(step.input, InputSelector::Previous);
    }

    #[test]
    fn unknown_step_type_fails_to_parse() {
        let parsed = serde_json::from_value::<StepConfig>(json!({
            "type": "telepathy",
            "expression": "a"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn all_step_kinds_parse() {
        let config = PipelineConfig::from_json(
            r#"{
                "steps": [
                    {"type": "path", "value": "$.user.id"},
                    {"type": "template", "template": {"type": "string", "content": "{}"}},
                    {"type": "expression", "expression": "user"},
                    {"type": "urlbuild", "baseURL": "api.example.com", "path": ["users"]},
                    {"type": "customfn", "function": "double", "parameters": {"value": 2}},
                    {"type": "httpinvoke", "method": "GET", "url": "http://api.example.com"}
                ]
            }"#,
        )
        .unwrap();
        let kinds: Vec<StepKind> = config.steps.iter().map(|s| s.action.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                StepKind::Path,
                StepKind::Template,
                StepKind::Expression,
                StepKind::UrlBuild,
                StepKind::CustomFn,
                StepKind::HttpInvoke,
            ]
        );
        assert!(!config.diagnostics);
    }

    #[test]
    fn template_source_inline_lines_join() {
        let source: TemplateSource = serde_json::from_value(json!({
            "type": "string",
            "content": ["{", "  \"a\": 1", "}"]
        }))
        .unwrap();
        assert_eq!(source.load().unwrap(), "{\n  \"a\": 1\n}");
    }

    #[test]
    fn template_source_missing_file_is_fatal_with_path() {
        let source = TemplateSource::File {
            path: PathBuf::from("/definitely/missing.tpl"),
        };
        let err = source.load().unwrap_err();
        assert!(err.to_string().contains("/definitely/missing.tpl"));
    }

    #[test]
    fn url_segments_parse_literal_and_expression() {
        let step: UrlBuildStep = serde_json::from_value(json!({
            "baseURL": "api.example.com",
            "path": ["users", {"expression": "id"}],
            "queryParams": {"page": "1", "q": {"expression": "term"}}
        }))
        .unwrap();
        assert_eq!(step.path[0], UrlSegment::Literal("users".into()));
        assert_eq!(
            step.path[1],
            UrlSegment::Expression {
                expression: "id".into()
            }
        );
    }

    #[test]
    fn step_config_round_trips_through_serde() {
        let step: StepConfig = serde_json::from_value(json!({
            "type": "customfn",
            "name": "sum",
            "input": "previous",
            "function": "add",
            "parameters": {"value1": 1, "value2": "$.two"},
            "args": []
        }))
        .unwrap();
        let text = serde_json::to_value(&step).unwrap();
        let back: StepConfig = serde_json::from_value(text).unwrap();
        assert_eq!(back, step);
    }
}
