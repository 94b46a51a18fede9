//! Post-transform expressions
//!
//! A post-transform reduces an assembled row to a single value. Fields of the
//! row are read with `$('name')`; the primary value is `$('x')` in
//! event-driven queries.
//!
//! The dataset engine only depends on the [`ExpressionEvaluator`] trait, so a
//! different expression language can be plugged in. [`TransformEvaluator`] is
//! the built-in implementation; it parses with nom and caches parsed trees
//! keyed by expression text, since one expression is evaluated once per row.

pub mod ast;
pub mod eval;
pub mod parser;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use parser::parse_expression;

use crate::error::ExprError;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Parsed expressions kept before the cache is reset
const MAX_CACHED_EXPRESSIONS: usize = 1024;

/// Evaluates an expression string against a field lookup
pub trait ExpressionEvaluator: Send + Sync {
    /// Parse errors and evaluation errors are both returned as [`ExprError`]
    fn evaluate(
        &self,
        expression: &str,
        lookup: &dyn Fn(&str) -> Option<Value>,
    ) -> Result<Value, ExprError>;

    /// Check that an expression parses, without evaluating it
    fn check(&self, expression: &str) -> Result<(), ExprError>;
}

/// Built-in evaluator with a parse cache
#[derive(Debug, Default)]
pub struct TransformEvaluator {
    cache: RwLock<HashMap<String, Arc<Expr>>>,
}

impl TransformEvaluator {
    /// Create an evaluator with an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an expression, reusing a cached tree when available
    pub fn compile(&self, expression: &str) -> Result<Arc<Expr>, ExprError> {
        if let Some(expr) = self.cache.read().get(expression) {
            return Ok(Arc::clone(expr));
        }

        let expr = Arc::new(parse_expression(expression)?);
        let mut cache = self.cache.write();
        if cache.len() >= MAX_CACHED_EXPRESSIONS {
            cache.clear();
        }
        cache.insert(expression.to_string(), Arc::clone(&expr));
        Ok(expr)
    }

    /// Number of cached expressions
    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }
}

impl ExpressionEvaluator for TransformEvaluator {
    fn evaluate(
        &self,
        expression: &str,
        lookup: &dyn Fn(&str) -> Option<Value>,
    ) -> Result<Value, ExprError> {
        let expr = self.compile(expression)?;
        eval::evaluate(&expr, lookup)
    }

    fn check(&self, expression: &str) -> Result<(), ExprError> {
        self.compile(expression).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_evaluator_uses_lookup() {
        let evaluator = TransformEvaluator::new();
        let lookup = |name: &str| match name {
            "x" => Some(json!(4)),
            "y" => Some(json!(4)),
            _ => None,
        };
        assert_eq!(evaluator.evaluate("$('x')==$('y')", &lookup).unwrap(), json!(true));
        assert_eq!(evaluator.evaluate("$('x') * 2", &lookup).unwrap(), json!(8));
    }

    #[test]
    fn test_parse_cache() {
        let evaluator = TransformEvaluator::new();
        let lookup = |_: &str| Some(json!(1));
        for _ in 0..5 {
            evaluator.evaluate("$('a') + 1", &lookup).unwrap();
        }
        assert_eq!(evaluator.cached(), 1);

        let first = evaluator.compile("$('a') + 1").unwrap();
        let second = evaluator.compile("$('a') + 1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_parse_errors_are_not_cached() {
        let evaluator = TransformEvaluator::new();
        assert!(evaluator.check("$('a') +").is_err());
        assert_eq!(evaluator.cached(), 0);
        assert!(evaluator.check("$('a') + 1").is_ok());
    }

    #[test]
    fn test_usable_as_trait_object() {
        let evaluator: Arc<dyn ExpressionEvaluator> = Arc::new(TransformEvaluator::new());
        let err = evaluator.evaluate("$('missing')", &|_: &str| None).unwrap_err();
        assert_eq!(err, ExprError::UndefinedField("missing".to_string()));
    }
}
