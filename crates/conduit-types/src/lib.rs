//! Shared types for the Conduit pipeline engine.
//!
//! This crate provides the foundational pieces used across all other Conduit
//! crates:
//! - `ConduitError` — unified error taxonomy
//! - `GlobalState` — the run-scoped document accumulating step outputs
//! - [`resolve`] / [`resolve_map`] — dynamic reference resolution against state
//! - `StepRecord` — per-step diagnostic snapshot

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unified error type for all Conduit subsystems.
#[derive(Debug, thiserror::Error)]
pub enum ConduitError {
    // === Configuration errors ===
    #[error("Invalid configuration for step '{step}': {message}")]
    StepConfig { step: String, message: String },

    #[error("Pipeline validation failed: {0}")]
    Validation(String),

    #[error("Unknown custom function '{name}'")]
    UnknownFunction { name: String },

    #[error("No evaluator registered for step kind '{kind}'")]
    UnknownEvaluator { kind: String },

    // === Evaluation errors ===
    #[error("Evaluator '{evaluator}' failed on step '{step}': {message}")]
    Evaluator {
        evaluator: String,
        step: String,
        message: String,
    },

    #[error("Custom function '{name}' failed: {message}")]
    Function { name: String, message: String },

    #[error("Invalid path expression '{expression}': {message}")]
    PathExpression {
        expression: String,
        message: String,
    },

    #[error("No value matched path expression '{expression}'")]
    PathUnmatched { expression: String },

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Template error: {0}")]
    Template(String),

    // === Resource errors ===
    #[error("Failed to load template from file '{path}': {source}")]
    TemplateLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ConduitError {
    /// Returns `true` if the error originates in the pipeline configuration
    /// rather than in the data flowing through it.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            ConduitError::StepConfig { .. }
                | ConduitError::Validation(_)
                | ConduitError::UnknownFunction { .. }
                | ConduitError::UnknownEvaluator { .. }
        )
    }
}

/// A convenience alias for `Result<T, ConduitError>`.
pub type Result<T> = std::result::Result<T, ConduitError>;

// ---------------------------------------------------------------------------
// GlobalState — run-scoped output document
// ---------------------------------------------------------------------------

/// The mutable document accumulating every step's output during one run.
///
/// A `GlobalState` is created empty at run start, written once per step, and
/// returned as the run's result. It belongs to exactly one run: concurrent
/// runs each build their own and nothing is shared or persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalState {
    doc: Value,
}

impl GlobalState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self {
            doc: Value::Object(Map::new()),
        }
    }

    /// The state as a JSON document, for path queries and final output.
    pub fn document(&self) -> &Value {
        &self.doc
    }

    /// Consume the state, yielding the accumulated document.
    pub fn into_document(self) -> Value {
        self.doc
    }

    /// Read a top-level entry by exact key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.doc.get(key)
    }

    /// Write `value` at `path`. The path may be a plain key or a dotted and
    /// indexed route (`a.b[0].c`); intermediate containers are created as
    /// needed, with numeric segments producing arrays.
    pub fn set(&mut self, path: &str, value: Value) {
        let segments = split_path(path);
        if segments.is_empty() {
            return;
        }
        set_segments(&mut self.doc, &segments, value);
    }

    /// Drop every entry. Used by steps that scope their output as the sole
    /// content of the resulting state.
    pub fn clear(&mut self) {
        self.doc = Value::Object(Map::new());
    }

    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        self.doc.as_object().map(Map::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for GlobalState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Split `a.b[0].c` into `[Key(a), Key(b), Index(0), Key(c)]`.
fn split_path(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let (name, mut rest) = match part.find('[') {
            Some(idx) => part.split_at(idx),
            None => (part, ""),
        };
        if !name.is_empty() {
            segments.push(Segment::Key(name.to_string()));
        }
        while let Some(close) = rest.find(']') {
            let inner = &rest[1..close];
            match inner.parse::<usize>() {
                Ok(n) => segments.push(Segment::Index(n)),
                Err(_) => segments.push(Segment::Key(inner.to_string())),
            }
            rest = &rest[close + 1..];
            if !rest.starts_with('[') {
                break;
            }
        }
    }
    segments
}

fn set_segments(target: &mut Value, segments: &[Segment], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *target = value;
        return;
    };
    let slot = match head {
        Segment::Key(key) => {
            if !matches!(target, Value::Object(_)) {
                *target = Value::Object(Map::new());
            }
            match target {
                Value::Object(map) => map.entry(key.clone()).or_insert(Value::Null),
                _ => return,
            }
        }
        Segment::Index(index) => {
            if !matches!(target, Value::Array(_)) {
                *target = Value::Array(Vec::new());
            }
            match target {
                Value::Array(items) => {
                    if items.len() <= *index {
                        items.resize(index + 1, Value::Null);
                    }
                    &mut items[*index]
                }
                _ => return,
            }
        }
    };
    set_segments(slot, rest, value);
}

// ---------------------------------------------------------------------------
// Reference resolution
// ---------------------------------------------------------------------------

/// Prefix marking a string as a path expression into the state document.
pub const REFERENCE_SIGIL: &str = "$.";

/// Resolve a single value against the state.
///
/// Strings starting with [`REFERENCE_SIGIL`] are evaluated as path
/// expressions against the state document and replaced by the first match
/// (JSON null when nothing matches). Every other value passes through
/// unchanged, so literals never need escaping.
pub fn resolve(value: &Value, state: &GlobalState) -> Result<Value> {
    if let Value::String(text) = value {
        if text.starts_with(REFERENCE_SIGIL) {
            let path = serde_json_path::JsonPath::parse(text).map_err(|e| {
                ConduitError::PathExpression {
                    expression: text.clone(),
                    message: e.to_string(),
                }
            })?;
            return Ok(path
                .query(state.document())
                .first()
                .cloned()
                .unwrap_or(Value::Null));
        }
    }
    Ok(value.clone())
}

/// Resolve every top-level value of a flat parameter map, preserving keys.
///
/// Resolution is shallow: values that are themselves objects or arrays pass
/// through without their nested strings being inspected.
pub fn resolve_map(params: &Map<String, Value>, state: &GlobalState) -> Result<Map<String, Value>> {
    let mut resolved = Map::with_capacity(params.len());
    for (key, value) in params {
        resolved.insert(key.clone(), resolve(value, state)?);
    }
    Ok(resolved)
}

// ---------------------------------------------------------------------------
// StepRecord — diagnostic snapshot of one step execution
// ---------------------------------------------------------------------------

/// Snapshot of one step execution: logged at debug verbosity, never part of
/// the run result.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub index: usize,
    pub name: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub input: Value,
    pub output: Value,
}
