//! Expression signal detection over stage bodies.

use serde_json::Value;

const ARITHMETIC_OPERATORS: &[&str] = &[
    "$add", "$subtract", "$multiply", "$divide", "$mod", "$abs", "$ceil", "$floor", "$round",
    "$trunc", "$sqrt", "$pow", "$exp", "$ln", "$log", "$log10",
];

const ITERATION_OPERATORS: &[&str] = &[
    "$map",
    "$filter",
    "$reduce",
    "$zip",
    "$range",
    "$concatArrays",
    "$sortArray",
    "$unwind",
];

const CONDITIONAL_OPERATORS: &[&str] = &["$cond", "$switch", "$ifNull"];

const AGGREGATE_OPERATORS: &[&str] = &["$facet", "$bucket", "$bucketAuto", "$accumulator"];

/// Operator classes found while walking a stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpressionSignals {
    /// Arithmetic operator occurrences.
    pub arithmetic: usize,
    /// Array/iteration operator occurrences.
    pub iteration: usize,
    /// Conditional operator occurrences.
    pub conditionals: usize,
    /// Deepest chain of conditionals nested in conditionals.
    pub conditional_depth: usize,
    /// Aggregate-structure builder occurrences.
    pub aggregates: usize,
}

impl ExpressionSignals {
    /// Scans a stage's operator key and body.
    #[must_use]
    pub fn scan_stage(operator: &str, body: &Value) -> Self {
        let mut signals = Self::default();
        signals.note(operator, 0);
        signals.walk(body, 0);
        signals
    }

    /// Scans an arbitrary expression tree.
    #[must_use]
    pub fn scan(value: &Value) -> Self {
        let mut signals = Self::default();
        signals.walk(value, 0);
        signals
    }

    /// Returns true when conditionals are nested at least two deep.
    #[must_use]
    pub fn has_nested_conditionals(&self) -> bool {
        self.conditional_depth >= 2
    }

    fn note(&mut self, key: &str, depth: usize) -> usize {
        if ARITHMETIC_OPERATORS.contains(&key) {
            self.arithmetic += 1;
        } else if ITERATION_OPERATORS.contains(&key) {
            self.iteration += 1;
        } else if AGGREGATE_OPERATORS.contains(&key) {
            self.aggregates += 1;
        } else if CONDITIONAL_OPERATORS.contains(&key) {
            self.conditionals += 1;
            let nested = depth + 1;
            self.conditional_depth = self.conditional_depth.max(nested);
            return nested;
        }
        depth
    }

    fn walk(&mut self, value: &Value, depth: usize) {
        match value {
            Value::Object(map) => {
                for (key, inner) in map {
                    let inner_depth = self.note(key, depth);
                    self.walk(inner, inner_depth);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.walk(item, depth);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_filter_has_no_signals() {
        let signals = ExpressionSignals::scan(&json!({"status": "active", "amount": {"$gt": 10}}));
        assert_eq!(signals, ExpressionSignals::default());
    }

    #[test]
    fn test_arithmetic_and_iteration() {
        let signals = ExpressionSignals::scan(&json!({
            "total": {"$multiply": ["$price", "$qty"]},
            "items": {"$map": {"input": "$lines", "in": {"$add": ["$$this.a", 1]}}}
        }));
        assert_eq!(signals.arithmetic, 2);
        assert_eq!(signals.iteration, 1);
    }

    #[test]
    fn test_nested_conditionals_depth() {
        let single = ExpressionSignals::scan(&json!({"$cond": ["$a", 1, 0]}));
        assert_eq!(single.conditional_depth, 1);
        assert!(!single.has_nested_conditionals());

        let nested = ExpressionSignals::scan(&json!({
            "$cond": {"if": "$a", "then": {"$switch": {"branches": [], "default": 0}}, "else": 0}
        }));
        assert_eq!(nested.conditional_depth, 2);
        assert!(nested.has_nested_conditionals());
    }

    #[test]
    fn test_sibling_conditionals_are_not_nested() {
        let signals = ExpressionSignals::scan(&json!({
            "a": {"$cond": ["$x", 1, 0]},
            "b": {"$ifNull": ["$y", 0]}
        }));
        assert_eq!(signals.conditionals, 2);
        assert_eq!(signals.conditional_depth, 1);
    }

    #[test]
    fn test_operator_key_counts() {
        let signals = ExpressionSignals::scan_stage("$unwind", &json!("$items"));
        assert_eq!(signals.iteration, 1);
    }
}
