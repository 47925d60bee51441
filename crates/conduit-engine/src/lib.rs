//! Pipeline execution engine, step evaluators, and configuration validation.
//!
//! This crate implements the core Conduit runner: the ordered step loop over
//! a run-scoped state document, input-selector resolution, dispatch through
//! the evaluator registry, output scoping, and the config lint pass.

pub mod config;
pub mod evaluator;
pub mod evaluators;
pub mod executor;
pub mod validation;

pub use config::{
    CustomFnStep, ExpressionStep, InputSelector, OutputScope, PathStep, PipelineConfig,
    StepAction, StepConfig, StepKind, TemplateContent, TemplateSource, TemplateStep,
    UrlBuildStep, UrlSegment,
};
pub use evaluator::{
    default_registry, registry_with, DynEvaluator, EvaluatorRegistry, StepEvaluator,
};
pub use evaluators::{
    CustomFnEvaluator, ExpressionEvaluator, HttpInvokeEvaluator, PathEvaluator,
    TemplateEvaluator, UrlBuildEvaluator,
};
pub use executor::PipelineExecutor;
pub use validation::{validate, validate_or_raise, Diagnostic, LintRule, Severity};
