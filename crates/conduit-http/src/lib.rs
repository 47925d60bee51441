//! HTTP invocation adapter for Conduit pipelines.
//!
//! Wraps the reqwest transport: resolves request parts against pipeline
//! state, injects bearer authentication, applies per-call timeout, proxy,
//! and status-validation rules, measures call duration, and classifies
//! failures into structured values instead of propagating them.

mod invoker;

pub use invoker::{status_accepted, FailureKind, HttpInvoker, HttpStep, InvokeOptions};
