//! Core utilities for batchql.
//!
//! This crate provides foundational types shared by the syntax layer and the
//! reference query engine:
//! - `span`: Source spans and line/column locations
//! - `diagnostics`: Error reporting

pub mod diagnostics;
pub mod span;

pub use diagnostics::{Diagnostic, DiagnosticBag, DiagnosticSeverity};
pub use span::{Location, Span};
