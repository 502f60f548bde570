//! Human-readable rendering of runs and results.

use colored::*;

use evalloop::eval::{EvalResult, EvalRunRecord, EvalRunStatus, EvalStatus, MetricSummary};

fn status_label(status: Option<EvalStatus>) -> String {
    match status {
        Some(EvalStatus::Passed) => "PASSED".green().to_string(),
        Some(EvalStatus::Failed) => "FAILED".red().bold().to_string(),
        None => String::new(),
    }
}

fn render_metric(name: &str, summary: &MetricSummary, indent: usize, out: &mut Vec<String>) {
    let pad = " ".repeat(indent);
    match summary {
        MetricSummary::Numeric {
            mean,
            min,
            max,
            std,
            status,
        } => out.push(
            format!(
                "{}{}: mean={:.4} min={:.4} max={:.4} std={:.4} {}",
                pad,
                name,
                mean,
                min,
                max,
                std,
                status_label(*status)
            )
            .trim_end()
            .to_string(),
        ),
        MetricSummary::Boolean {
            true_count,
            true_rate,
            status,
        } => out.push(
            format!(
                "{}{}: true_count={} true_rate={:.4} {}",
                pad,
                name,
                true_count,
                true_rate,
                status_label(*status)
            )
            .trim_end()
            .to_string(),
        ),
        MetricSummary::Nested { metrics } => {
            out.push(format!("{}{}:", pad, name));
            for (child, summary) in metrics {
                render_metric(child, summary, indent + 2, out);
            }
        }
    }
}

/// Per-scorer summary, optionally followed by every case.
pub fn render_result(result: &EvalResult, detailed: bool) -> String {
    let mut out = vec![format!(
        "{} {} ({} cases)",
        "Run".cyan(),
        result.run_id,
        result.eval_case_results.len()
    )];

    for (scorer, summary) in &result.summary {
        out.push(format!("  {}", scorer.bold()));
        for (metric, metric_summary) in &summary.metrics {
            render_metric(metric, metric_summary, 4, &mut out);
        }
    }

    if detailed {
        out.push(String::new());
        for case_result in &result.eval_case_results {
            let scores: Vec<String> = case_result
                .scorer_results
                .values()
                .flat_map(|r| {
                    r.metrics
                        .iter()
                        .map(move |(name, m)| format!("{}.{}={}", r.scorer_name, name, m.value))
                })
                .collect();
            out.push(format!(
                "  [{}] {} {}",
                case_result.index,
                case_result.case.case_id(),
                scores.join(" ")
            ));
        }
    }

    let verdict = if result.passed() {
        "All criteria passed".green().to_string()
    } else {
        format!("Failed: {}", result.failed_metrics().join(", "))
            .red()
            .to_string()
    };
    out.push(verdict);
    out.join("\n")
}

/// One-line description of a run record.
pub fn render_run(run: &EvalRunRecord) -> String {
    let status = match run.status {
        EvalRunStatus::Running => "running".yellow(),
        EvalRunStatus::Complete => "complete".green(),
        EvalRunStatus::Failed => "failed".red(),
    };
    let mut line = format!(
        "{}  {}  dataset={} cases={}",
        run.run_id, status, run.dataset_id, run.case_count
    );
    if let Some(finished) = run.finished_at {
        line.push_str(&format!(" took={}ms", finished - run.started_at));
    }
    if let Some(error) = &run.error {
        line.push_str(&format!(" error={}", error));
    }
    line
}
