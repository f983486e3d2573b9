//! `recommendations` command handlers

use crate::cli::context::{parse_datetime, read_resources};
use crate::cli::output::{
    format_history_table, format_plugin_failures, format_recommendation_summary,
    format_recommendations_table, to_json,
};
use crate::cli::{Context, DismissArgs, HistoryArgs, RecommendationsListArgs, SnoozeArgs, UndismissArgs};
use crate::dismissal::{merge_with_store, DismissalReason, DismissalStore};
use crate::engine::{summarize, DismissAction, DismissOutcome, Engine, RecommendationFilter};
use crate::plugin::{ActionType, Recommendation};
use chrono::Utc;
use colored::Colorize;
use serde_json::json;
use std::path::Path;

fn parse_filter(args: &RecommendationsListArgs) -> anyhow::Result<RecommendationFilter> {
    let action_types = args
        .action_types
        .iter()
        .map(|a| a.parse::<ActionType>().map_err(anyhow::Error::msg))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(RecommendationFilter {
        action_types,
        min_savings: args.min_savings,
    })
}

/// Expire finished snoozes and persist the reactivation.
fn refresh_store(store: &mut DismissalStore) -> anyhow::Result<()> {
    if !store.reactivate_expired(Utc::now()).is_empty() {
        store.save()?;
    }
    Ok(())
}

/// Handle `costmesh recommendations list`
pub async fn handle_list(args: &RecommendationsListArgs, ctx: &Context) -> anyhow::Result<String> {
    let filter = parse_filter(args)?;
    let resources = read_resources(&args.resources)?;
    let mut store = ctx.load_dismissals()?;
    refresh_store(&mut store)?;

    ctx.with_engine(|engine| async move {
        let fetched = engine.recommendations(&resources, &ctx.options()).await?;
        let merged = merge_with_store(
            fetched.recommendations,
            &store,
            args.include_dismissed,
            Utc::now(),
        );
        let recommendations = filter.apply(merged.recommendations);
        let summary = summarize(&recommendations);

        if ctx.json {
            return to_json(&json!({
                "recommendations": recommendations,
                "summary": summary,
                "hidden": merged.hidden,
                "errors": fetched.errors,
            }));
        }

        let mut sections = Vec::new();
        if !args.summary {
            sections.push(format_recommendations_table(&recommendations));
        }
        sections.push(format_recommendation_summary(&summary));
        if merged.hidden > 0 {
            sections.push(format!(
                "{} dismissed or snoozed recommendation(s) hidden (use --include-dismissed)",
                merged.hidden
            ));
        }
        if !fetched.errors.is_empty() {
            sections.push(format_plugin_failures(&fetched.errors));
        }
        Ok(sections.join("\n\n"))
    })
    .await
}

/// The recommendation as currently reported, if a resource set was given.
async fn find_snapshot(
    engine: &Engine,
    ctx: &Context,
    resources: Option<&Path>,
    id: &str,
) -> anyhow::Result<Option<Recommendation>> {
    let Some(path) = resources else {
        return Ok(None);
    };
    let resources = read_resources(path)?;
    let fetched = engine.recommendations(&resources, &ctx.options()).await?;
    let snapshot = fetched.recommendations.into_iter().find(|r| r.id == id);
    if snapshot.is_none() {
        tracing::warn!(recommendation = id, "Recommendation not reported for this resource set");
    }
    Ok(snapshot)
}

fn render_transition(json: bool, verb: &str, outcome: &DismissOutcome) -> anyhow::Result<String> {
    if json {
        return to_json(outcome);
    }

    let record = &outcome.record;
    let mut output = format!("{} {} {}", "✓".green(), verb, record.recommendation_id);
    if let Some(reason) = record.reason {
        output.push_str(&format!(" (reason: {})", reason));
    }
    if let Some(until) = record.expires_at {
        output.push_str(&format!(" until {}", until.format("%Y-%m-%d %H:%M UTC")));
    }
    match (&outcome.forwarded_to, &outcome.forward_error) {
        (Some(plugin), None) => output.push_str(&format!("\n  Forwarded to plugin '{}'", plugin)),
        (Some(plugin), Some(error)) => output.push_str(&format!(
            "\n  {} plugin '{}' rejected the change: {} (kept locally)",
            "Warning:".yellow(),
            plugin,
            error
        )),
        _ => {}
    }
    Ok(output)
}

/// Handle `costmesh recommendations dismiss`
pub async fn handle_dismiss(args: &DismissArgs, ctx: &Context) -> anyhow::Result<String> {
    let reason: DismissalReason = args.reason.parse().map_err(anyhow::Error::msg)?;
    let mut store = ctx.load_dismissals()?;
    refresh_store(&mut store)?;

    let outcome = ctx
        .with_engine(|engine| async move {
            let snapshot = find_snapshot(&engine, ctx, args.resources.as_deref(), &args.id).await?;
            let action = DismissAction::Dismiss {
                reason,
                note: args.note.clone(),
            };
            let options = ctx.options();
            Ok(engine.dismiss(&mut store, &args.id, action, snapshot, &options).await?)
        })
        .await?;

    render_transition(ctx.json, "Dismissed", &outcome)
}

/// Handle `costmesh recommendations snooze`
pub async fn handle_snooze(args: &SnoozeArgs, ctx: &Context) -> anyhow::Result<String> {
    let until = parse_datetime(&args.until)?;
    let reason = args
        .reason
        .as_deref()
        .map(str::parse::<DismissalReason>)
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let mut store = ctx.load_dismissals()?;
    refresh_store(&mut store)?;

    let outcome = ctx
        .with_engine(|engine| async move {
            let snapshot = find_snapshot(&engine, ctx, args.resources.as_deref(), &args.id).await?;
            let action = DismissAction::Snooze {
                until,
                reason,
                note: args.note.clone(),
            };
            let options = ctx.options();
            Ok(engine.dismiss(&mut store, &args.id, action, snapshot, &options).await?)
        })
        .await?;

    render_transition(ctx.json, "Snoozed", &outcome)
}

/// Handle `costmesh recommendations undismiss`
///
/// Purely local: plugins are not told about restorations.
pub fn handle_undismiss(args: &UndismissArgs, ctx: &Context) -> anyhow::Result<String> {
    let mut store = ctx.load_dismissals()?;
    refresh_store(&mut store)?;
    let record = store.undismiss(&args.id, Utc::now())?.clone();
    store.save()?;

    let outcome = DismissOutcome {
        record,
        forwarded_to: None,
        forward_error: None,
    };
    render_transition(ctx.json, "Restored", &outcome)
}

/// Handle `costmesh recommendations history`
pub fn handle_history(args: &HistoryArgs, ctx: &Context) -> anyhow::Result<String> {
    let store = ctx.load_dismissals()?;
    let Some(record) = store.get(&args.id) else {
        anyhow::bail!("No lifecycle history for recommendation '{}'", args.id);
    };

    if ctx.json {
        to_json(record)
    } else {
        Ok(format_history_table(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::GlobalArgs;
    use crate::config::CostConfig;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> Context {
        let mut config = CostConfig::default();
        config.dismissals.path = Some(dir.path().join("dismissed.json"));
        Context::new(config, None, &GlobalArgs::default())
    }

    #[test]
    fn parse_filter_rejects_unknown_action() {
        let args = RecommendationsListArgs {
            resources: "plan.json".into(),
            action_types: vec!["rightsize".to_string(), "teleport".to_string()],
            min_savings: None,
            include_dismissed: false,
            summary: false,
        };
        assert!(parse_filter(&args).is_err());
    }

    #[test]
    fn undismiss_then_history() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);

        let mut store = ctx.load_dismissals().unwrap();
        store
            .dismiss("rec-1", DismissalReason::Other, None, None, Utc::now())
            .unwrap();
        store.save().unwrap();

        let output = handle_undismiss(&UndismissArgs { id: "rec-1".to_string() }, &ctx).unwrap();
        assert!(output.contains("Restored rec-1"));

        let history = handle_history(&HistoryArgs { id: "rec-1".to_string() }, &ctx).unwrap();
        assert!(history.contains("dismissed"));
        assert!(history.contains("undismissed"));
    }

    #[test]
    fn undismiss_of_active_recommendation_fails() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        assert!(handle_undismiss(&UndismissArgs { id: "rec-9".to_string() }, &ctx).is_err());
    }

    #[test]
    fn history_of_unknown_recommendation_fails() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let err = handle_history(&HistoryArgs { id: "missing".to_string() }, &ctx).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
