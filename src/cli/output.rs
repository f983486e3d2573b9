//! Output formatting helpers for CLI commands

use crate::budget::{BudgetEvaluation, BudgetHealth};
use crate::cache::CacheStats;
use crate::dismissal::DismissalRecord;
use crate::engine::{
    BatchOutcome, EstimateOutcome, PluginFailure, RecommendationSummary, ResourceError,
};
use crate::plugin::{LifecycleStatus, Recommendation};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde::Serialize;

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);
    table
}

fn money(amount: f64, currency: &str) -> String {
    format!("{:.2} {}", amount, currency)
}

/// Pretty JSON for `--json` output.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Format cost results as a table. `actual` shows the window total instead of
/// the monthly figure.
pub fn format_cost_table(outcome: &BatchOutcome, actual: bool) -> String {
    let amount_header = if actual { "Total" } else { "Monthly" };
    let mut table = new_table(vec!["Resource", "Type", "Plugin", amount_header, "Recs"]);

    for result in &outcome.results {
        let amount = if actual { result.total } else { result.monthly };
        table.add_row(vec![
            Cell::new(&result.resource_id),
            Cell::new(&result.resource_type),
            Cell::new(&result.plugin),
            Cell::new(money(amount, &result.currency)),
            Cell::new(result.recommendations.len()),
        ]);
    }

    let total: f64 = if actual {
        outcome.results.iter().map(|r| r.total).sum()
    } else {
        outcome.total_monthly()
    };
    let currency = outcome
        .results
        .first()
        .map(|r| r.currency.as_str())
        .unwrap_or("USD");

    let mut output = table.to_string();
    output.push_str(&format!(
        "\n{} {}",
        "Total:".bold(),
        money(total, currency)
    ));
    if outcome.from_cache {
        output.push_str(&format!(" {}", "(cached)".dimmed()));
    }
    output
}

/// Summary of per-resource failures, printed after the primary results.
pub fn format_resource_errors(errors: &[ResourceError]) -> String {
    let mut output = format!(
        "{}",
        format!("{} resource(s) failed:", errors.len()).red().bold()
    );
    for error in errors {
        output.push_str(&format!("\n  - {}", error));
    }
    output
}

pub fn format_plugin_failures(failures: &[PluginFailure]) -> String {
    let mut output = format!(
        "{}",
        format!("{} plugin(s) failed to return recommendations:", failures.len()).yellow()
    );
    for failure in failures {
        output.push_str(&format!(
            "\n  - {} ({}): {}",
            failure.plugin, failure.kind, failure.message
        ));
    }
    output
}

fn status_cell(status: LifecycleStatus) -> String {
    match status {
        LifecycleStatus::Active => "active".green().to_string(),
        LifecycleStatus::Dismissed => "dismissed".dimmed().to_string(),
        LifecycleStatus::Snoozed => "snoozed".cyan().to_string(),
    }
}

pub fn format_recommendations_table(recommendations: &[Recommendation]) -> String {
    let mut table = new_table(vec![
        "ID",
        "Resource",
        "Action",
        "Savings/mo",
        "Status",
        "Plugin",
        "Description",
    ]);

    for rec in recommendations {
        table.add_row(vec![
            Cell::new(&rec.id),
            Cell::new(&rec.resource_id),
            Cell::new(rec.action_type),
            Cell::new(money(rec.estimated_savings, &rec.currency)),
            Cell::new(status_cell(rec.status)),
            Cell::new(&rec.plugin),
            Cell::new(&rec.description),
        ]);
    }

    table.to_string()
}

pub fn format_recommendation_summary(summary: &RecommendationSummary) -> String {
    let mut table = new_table(vec!["Action", "Count", "Savings/mo"]);
    for (action, entry) in &summary.by_action {
        table.add_row(vec![
            Cell::new(action),
            Cell::new(entry.count),
            Cell::new(format!("{:.2}", entry.savings)),
        ]);
    }

    format!(
        "{}\n{} {} recommendation(s), {:.2} potential monthly savings",
        table,
        "Summary:".bold(),
        summary.count,
        summary.total_savings
    )
}

pub fn format_estimates_table(outcome: &EstimateOutcome) -> String {
    let mut table = new_table(vec!["Resource", "Baseline", "Modified", "Delta", "Plugin", "Source"]);

    for estimate in &outcome.results {
        let delta = format!("{:+.2} {}", estimate.delta, estimate.currency);
        let delta = if estimate.delta > 0.0 {
            delta.red().to_string()
        } else {
            delta.green().to_string()
        };
        table.add_row(vec![
            Cell::new(&estimate.resource_id),
            Cell::new(money(estimate.baseline, &estimate.currency)),
            Cell::new(money(estimate.modified, &estimate.currency)),
            Cell::new(delta),
            Cell::new(&estimate.plugin),
            Cell::new(if estimate.fallback { "projected" } else { "estimate" }),
        ]);
    }

    format!(
        "{}\n{} {:+.2}",
        table,
        "Total delta:".bold(),
        outcome.total_delta()
    )
}

/// Colored health label
pub fn health_cell(health: BudgetHealth) -> String {
    match health {
        BudgetHealth::Ok => "OK".green().to_string(),
        BudgetHealth::Warning => "WARNING".yellow().to_string(),
        BudgetHealth::Critical => "CRITICAL".red().to_string(),
        BudgetHealth::Exceeded => "EXCEEDED".red().bold().to_string(),
        BudgetHealth::Unspecified => "UNSPECIFIED".dimmed().to_string(),
    }
}

pub fn format_budget_table(evaluation: &BudgetEvaluation) -> String {
    let mut table = new_table(vec!["Scope", "Spend", "Budget", "Used", "Health", "Period"]);

    for scope in &evaluation.scopes {
        table.add_row(vec![
            Cell::new(scope.label()),
            Cell::new(money(scope.spend, &scope.currency)),
            Cell::new(money(scope.budget, &scope.currency)),
            Cell::new(format!("{:.1}%", scope.percentage)),
            Cell::new(health_cell(scope.health)),
            Cell::new(format!("{:?}", scope.period).to_lowercase()),
        ]);
    }

    format!(
        "{}\n{} {}",
        table,
        "Overall:".bold(),
        health_cell(evaluation.overall_health)
    )
}

pub fn format_history_table(record: &DismissalRecord) -> String {
    let mut table = new_table(vec!["When", "Action", "Reason", "Expires", "Note"]);

    for event in &record.history {
        table.add_row(vec![
            Cell::new(event.at.format("%Y-%m-%d %H:%M:%S UTC")),
            Cell::new(event.action),
            Cell::new(event.reason.map(|r| r.to_string()).unwrap_or_default()),
            Cell::new(
                event
                    .expires_at
                    .map(|t| t.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
            ),
            Cell::new(event.note.as_deref().unwrap_or("")),
        ]);
    }

    format!(
        "{} {} ({})\n{}",
        "Recommendation".bold(),
        record.recommendation_id,
        status_cell(record.status),
        table
    )
}

pub fn format_cache_stats(stats: &CacheStats) -> String {
    let mut table = new_table(vec!["Field", "Value"]);
    let rows = vec![
        ("Directory", stats.directory.display().to_string()),
        ("Enabled", stats.enabled.to_string()),
        ("Entries", stats.entries.to_string()),
        ("Expired", stats.expired.to_string()),
        (
            "Size",
            format!(
                "{:.1} KiB / {:.1} MiB",
                stats.total_bytes as f64 / 1024.0,
                stats.max_bytes as f64 / (1024.0 * 1024.0)
            ),
        ),
        (
            "Oldest",
            stats.oldest.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string()),
        ),
        (
            "Newest",
            stats.newest.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string()),
        ),
    ];
    for (field, value) in rows {
        table.add_row(vec![Cell::new(field), Cell::new(value)]);
    }
    table.to_string()
}
