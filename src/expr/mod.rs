//! Restricted expression language for computed fields.

pub mod eval;
pub mod lexer;
pub mod parser;
pub mod value;

pub use eval::{Bindings, Scope};
pub use value::Value;

use crate::error::ExprError;

/// A compiled computed-field snippet.
#[derive(Debug, Clone)]
pub struct Snippet {
    program: parser::Program,
}

impl Snippet {
    /// Parse `source`; syntax errors surface here, before any row is read.
    pub fn compile(source: &str) -> Result<Self, ExprError> {
        Ok(Self {
            program: parser::parse_program(source)?,
        })
    }

    /// Evaluate against a fresh overlay of `base`.
    ///
    /// `Ok(None)` means the snippet ended in a statement with no value and
    /// the field should be left out of the computed record.
    pub fn evaluate(&self, base: &Bindings) -> Result<Option<Value>, ExprError> {
        eval::run_program(&self.program, base)
    }
}
