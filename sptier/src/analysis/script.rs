//! Lexical sub-scoring of `$function` script bodies.

use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static LOOP_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(for|while|do|forEach|map|reduce)\b").expect("loop keyword pattern")
});

/// Lexical signals found in a script body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptSignals {
    /// Loop keyword and iteration method occurrences.
    pub loops: usize,
    /// Deepest brace nesting.
    pub brace_depth: usize,
    /// Arithmetic operator characters outside comments.
    pub arithmetic_ops: usize,
}

impl ScriptSignals {
    /// Scans a script body.
    #[must_use]
    pub fn scan(script: &str) -> Self {
        let code = strip_line_comments(script);

        let loops = LOOP_KEYWORDS.find_iter(&code).count();

        let mut depth = 0usize;
        let mut brace_depth = 0usize;
        let mut arithmetic_ops = 0usize;
        for ch in code.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    brace_depth = brace_depth.max(depth);
                }
                '}' => depth = depth.saturating_sub(1),
                '+' | '-' | '*' | '/' | '%' => arithmetic_ops += 1,
                _ => {}
            }
        }

        Self {
            loops,
            brace_depth,
            arithmetic_ops,
        }
    }

    /// Uncapped sub-score: one per loop, one per nesting level beyond the
    /// function body, one per five arithmetic operators.
    #[must_use]
    pub fn raw_score(&self) -> u64 {
        let score = self.loops + self.brace_depth.saturating_sub(1) + self.arithmetic_ops / 5;
        u64::try_from(score).unwrap_or(u64::MAX)
    }

    /// Sub-score capped at `cap`.
    #[must_use]
    pub fn score(&self, cap: u64) -> u64 {
        self.raw_score().min(cap)
    }
}

fn strip_line_comments(script: &str) -> String {
    script
        .lines()
        .map(|line| line.split_once("//").map_or(line, |(code, _)| code))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trivial_function() {
        let signals = ScriptSignals::scan("function(x) { return x * 2; }");
        assert_eq!(signals.loops, 0);
        assert_eq!(signals.brace_depth, 1);
        assert_eq!(signals.arithmetic_ops, 1);
        assert_eq!(signals.score(5), 0);
    }

    #[test]
    fn test_loops_and_nesting() {
        let script = r"
            function(items) {
                let total = 0;
                for (let i = 0; i < items.length; i++) {
                    if (items[i].ok) { total += items[i].v; }
                }
                return total;
            }";
        let signals = ScriptSignals::scan(script);
        assert_eq!(signals.loops, 1);
        assert_eq!(signals.brace_depth, 3);
        assert_eq!(signals.score(5), 3);
    }

    #[test]
    fn test_only_listed_iteration_keywords_count() {
        let signals = ScriptSignals::scan("function(xs) { return xs.filter(x => x.ok).map(x => x.v); }");
        assert_eq!(signals.loops, 1);
    }

    #[test]
    fn test_comments_ignored() {
        let signals = ScriptSignals::scan("function() { // for while do + - * /\n return 1; }");
        assert_eq!(signals.loops, 0);
        assert_eq!(signals.arithmetic_ops, 0);
    }

    #[test]
    fn test_adversarial_script_is_capped() {
        let script = "function(a){".to_string() + &"for(;;){".repeat(50) + &"}".repeat(51);
        let signals = ScriptSignals::scan(&script);
        assert!(signals.raw_score() > 5);
        assert_eq!(signals.score(5), 5);
    }
}
