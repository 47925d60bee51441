//! Built-in step evaluators.

mod custom_fn;
mod expression;
mod http_invoke;
mod path;
mod template;
mod url_build;

pub use custom_fn::CustomFnEvaluator;
pub use expression::ExpressionEvaluator;
pub use http_invoke::HttpInvokeEvaluator;
pub use path::PathEvaluator;
pub use template::TemplateEvaluator;
pub use url_build::UrlBuildEvaluator;

pub(crate) use expression::evaluate_expression;
