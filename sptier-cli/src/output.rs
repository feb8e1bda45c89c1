//! Pretty rendering of advisory and start results.

use colored::Colorize;
use serde_json::Value;
use std::fmt::Write;

use sptier::advisor::AdvisoryReport;
use sptier::batch::{BatchReport, BatchStatus, ProcessorFailure, ProcessorResult, StartReport};

/// Human-readable body of a successful result.
pub trait Render {
    /// One headline plus indented detail lines.
    fn render(&self, out: &mut String);
}

impl Render for AdvisoryReport {
    fn render(&self, out: &mut String) {
        let rec = &self.recommendation;
        let _ = writeln!(
            out,
            "{} {} {} ({}-driven, confidence {:.2})",
            self.processor.bold(),
            "→".dimmed(),
            rec.tier.green().bold(),
            rec.driver,
            rec.confidence
        );
        let _ = writeln!(
            out,
            "  Complexity score: {}   Parallelism total: {}   Stages: {}",
            rec.complexity_score, rec.parallelism_total, self.analysis.pipeline_stages
        );
        let _ = writeln!(out, "  {}", rec.reasoning);

        if !self.analysis.complexity_factors.is_empty() {
            let _ = writeln!(out, "  {}", "Complexity factors:".cyan());
            for factor in &self.analysis.complexity_factors {
                let _ = writeln!(out, "    • {factor}");
            }
        }
        if !self.analysis.parallelism_details.is_empty() {
            let _ = writeln!(out, "  {}", "Parallelism:".cyan());
            for detail in &self.analysis.parallelism_details {
                let _ = writeln!(out, "    • {detail}");
            }
        }
        if !self.analysis.unknown_operators.is_empty() {
            let _ = writeln!(
                out,
                "  {} {}",
                "Unrecognized operators:".yellow(),
                self.analysis.unknown_operators.join(", ")
            );
        }
        if let Some(cost) = &rec.estimated_cost {
            let _ = writeln!(
                out,
                "  Relative cost: {} × {} = {:.1} ({} volume)",
                cost.cost_weight, cost.multiplier, cost.relative_cost, cost.volume
            );
        }
    }
}

impl Render for StartReport {
    fn render(&self, out: &mut String) {
        if let Some(advisory) = &self.advisory {
            advisory.render(out);
        }
        let deployment = &self.deployment;
        let _ = writeln!(
            out,
            "{} {} started on {} after {} attempt(s)",
            "✓".green(),
            deployment.processor.bold(),
            deployment.tier.green().bold(),
            deployment.attempts()
        );
        for record in &deployment.history {
            let _ = writeln!(out, "    {} {}: {}", "✗".red(), record.tier, record.rejection_reason);
        }
    }
}

fn render_failure(name: &str, failure: &ProcessorFailure, out: &mut String) {
    let _ = writeln!(
        out,
        "{} {}: {} {}",
        "✗".red(),
        name.bold(),
        failure.error_kind.red(),
        failure.message
    );
    if let Some(Value::Array(history)) = failure.context.get("history") {
        for entry in history {
            let tier = entry.get("tier").and_then(Value::as_str).unwrap_or("?");
            let reason = entry.get("rejection_reason").and_then(Value::as_str).unwrap_or("");
            let _ = writeln!(out, "    {tier}: {reason}");
        }
    }
}

/// Renders one processor's result.
pub fn render_result<T: Render>(name: &str, result: &ProcessorResult<T>) -> String {
    let mut out = String::new();
    match result {
        ProcessorResult::Ok(value) => value.render(&mut out),
        ProcessorResult::Error(failure) => render_failure(name, failure, &mut out),
    }
    out
}

/// Renders a batch, one block per processor, then a summary line.
pub fn render_batch<T: Render>(report: &BatchReport<T>) -> String {
    let mut out = String::new();
    for (name, result) in &report.results {
        out.push_str(&render_result(name, result));
        out.push('\n');
    }

    let summary = format!("{} succeeded, {} failed", report.succeeded(), report.failed());
    let _ = match report.status {
        BatchStatus::Ok => writeln!(out, "{}", summary.green()),
        BatchStatus::Error => writeln!(out, "{}", summary.red()),
    };
    out
}
