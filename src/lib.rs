//! A name-resolution and type-elaboration middle end: takes a parsed module's HIR and produces a
//! fully typed MIR, or a set of diagnostics explaining why it couldn't.
//!
//! [`resolve::resolve_module`] is the single entry point (§6); everything else is reachable
//! through the [`context::Context`] it mutates.

pub mod constraint;
pub mod context;
pub mod diag;
pub mod elaborate;
pub mod hir;
pub mod idx;
pub mod instantiate;
pub mod intern;
pub mod method;
pub mod reify;
pub mod resolve;
pub mod scope;
pub mod span;
pub mod types;
pub mod unify;

pub use context::Context;
pub use diag::{Builder, Diagnostic, Level, RResult};
pub use resolve::resolve_module;
