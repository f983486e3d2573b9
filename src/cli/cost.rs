//! `cost` command handlers

use crate::cli::context::{parse_datetime, read_resources};
use crate::cli::output::{
    format_cost_table, format_estimates_table, format_plugin_failures, format_resource_errors,
    to_json,
};
use crate::cli::{ActualArgs, Context, EstimateArgs, ProjectedArgs};
use crate::dismissal::merge_with_store;
use crate::engine::{attach_recommendations, BatchOutcome, CostOperation, EstimateItem, PluginFailure};
use crate::plugin::{CostWindow, Recommendation, ResourceDescriptor};
use anyhow::Context as _;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::Path;

/// Handle `costmesh cost projected`
pub async fn handle_projected(args: &ProjectedArgs, ctx: &Context) -> anyhow::Result<String> {
    let resources = read_resources(&args.resources)?;
    let fetch_recommendations = !args.no_recommendations && ctx.config.engine.recommendations;

    ctx.with_engine(|engine| async move {
        let options = ctx.options();
        let background = fetch_recommendations
            .then(|| engine.spawn_recommendations(resources.clone(), options.clone()));

        let mut outcome = engine
            .execute(&CostOperation::Projected, &resources, &options)
            .await?;

        let mut unattached: Vec<Recommendation> = Vec::new();
        let mut hidden = 0;
        let mut failures: Vec<PluginFailure> = Vec::new();
        if let Some(task) = background {
            if let Some(fetched) = task.join().await {
                failures = fetched.errors;
                match ctx.load_dismissals() {
                    Ok(store) => {
                        let merged = merge_with_store(
                            fetched.recommendations,
                            &store,
                            args.include_dismissed,
                            Utc::now(),
                        );
                        hidden = merged.hidden;
                        unattached =
                            attach_recommendations(&mut outcome.results, &resources, merged.recommendations);
                    }
                    Err(e) => {
                        tracing::warn!(error = %format!("{:#}", e), "Skipping recommendations");
                    }
                }
            }
        }

        render_projected(ctx.json, &outcome, &unattached, hidden, &failures)
    })
    .await
}

fn render_projected(
    json: bool,
    outcome: &BatchOutcome,
    unattached: &[Recommendation],
    hidden: usize,
    failures: &[PluginFailure],
) -> anyhow::Result<String> {
    if json {
        return to_json(&json!({
            "results": outcome.results,
            "errors": outcome.errors,
            "total_monthly": outcome.total_monthly(),
            "unattached_recommendations": unattached,
            "hidden_recommendations": hidden,
            "recommendation_errors": failures,
        }));
    }

    let mut sections = vec![format_cost_table(outcome, false)];
    if !unattached.is_empty() {
        sections.push(format!(
            "{} recommendation(s) could not be matched to a resource",
            unattached.len()
        ));
    }
    if hidden > 0 {
        sections.push(format!(
            "{} dismissed or snoozed recommendation(s) hidden (use --include-dismissed)",
            hidden
        ));
    }
    if !failures.is_empty() {
        sections.push(format_plugin_failures(failures));
    }
    if !outcome.errors.is_empty() {
        sections.push(format_resource_errors(&outcome.errors));
    }
    Ok(sections.join("\n\n"))
}

/// Handle `costmesh cost actual`
pub async fn handle_actual(args: &ActualArgs, ctx: &Context) -> anyhow::Result<String> {
    let resources = read_resources(&args.resources)?;
    let from = parse_datetime(&args.from)?;
    let to = match &args.to {
        Some(to) => parse_datetime(to)?,
        None => Utc::now(),
    };
    let mut window = CostWindow::new(from, to);
    window.group_by = args.group_by.clone();
    let operation = CostOperation::Actual(window);

    ctx.with_engine(|engine| async move {
        let outcome = engine.execute(&operation, &resources, &ctx.options()).await?;
        if ctx.json {
            return to_json(&json!({
                "from": from,
                "to": to,
                "results": outcome.results,
                "errors": outcome.errors,
            }));
        }

        let mut output = format_cost_table(&outcome, true);
        if !outcome.errors.is_empty() {
            output.push_str("\n\n");
            output.push_str(&format_resource_errors(&outcome.errors));
        }
        Ok(output)
    })
    .await
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EstimateDocument {
    Items(Vec<EstimateItem>),
    Resources(Vec<ResourceDescriptor>),
    Resource(Box<ResourceDescriptor>),
}

/// Parse `key=value`. Values that parse as JSON keep their type; anything
/// else is a string.
pub fn parse_override(raw: &str) -> anyhow::Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("Invalid override '{}': expected key=value", raw))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("Invalid override '{}': empty key", raw);
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Estimate items from the input file and `--set` overrides.
///
/// With overrides the file holds one descriptor or an array of them, and
/// every resource gets the same changes. Without overrides it must hold
/// estimate items.
pub fn read_estimate_items(path: &Path, overrides: &[String]) -> anyhow::Result<Vec<EstimateItem>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read estimate input {}", path.display()))?;
    let document: EstimateDocument = serde_json::from_str(&content)
        .with_context(|| format!("Invalid estimate input {}", path.display()))?;

    let mut changes = Map::new();
    for raw in overrides {
        let (key, value) = parse_override(raw)?;
        changes.insert(key, value);
    }

    match document {
        EstimateDocument::Items(mut items) => {
            for item in &mut items {
                item.overrides.extend(changes.clone());
            }
            Ok(items)
        }
        EstimateDocument::Resources(resources) => {
            if changes.is_empty() {
                anyhow::bail!("No changes to estimate: pass --set key=value or an items file");
            }
            Ok(resources
                .into_iter()
                .map(|r| EstimateItem::new(r, changes.clone()))
                .collect())
        }
        EstimateDocument::Resource(resource) => {
            if changes.is_empty() {
                anyhow::bail!("No changes to estimate: pass --set key=value or an items file");
            }
            Ok(vec![EstimateItem::new(*resource, changes)])
        }
    }
}

/// Handle `costmesh cost estimate`
pub async fn handle_estimate(args: &EstimateArgs, ctx: &Context) -> anyhow::Result<String> {
    let items = read_estimate_items(&args.input, &args.overrides)?;

    ctx.with_engine(|engine| async move {
        let outcome = engine.estimate(&items, &ctx.options()).await?;
        if ctx.json {
            return to_json(&json!({
                "results": outcome.results,
                "errors": outcome.errors,
                "total_delta": outcome.total_delta(),
            }));
        }

        let mut output = format_estimates_table(&outcome);
        if !outcome.errors.is_empty() {
            output.push_str("\n\n");
            output.push_str(&format_resource_errors(&outcome.errors));
        }
        Ok(output)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parse_override_keeps_json_types() {
        assert_eq!(
            parse_override("instanceType=m5.large").unwrap(),
            ("instanceType".to_string(), json!("m5.large"))
        );
        assert_eq!(parse_override("count=3").unwrap().1, json!(3));
        assert_eq!(parse_override("spot=true").unwrap().1, json!(true));
        assert!(parse_override("no-separator").is_err());
        assert!(parse_override("=value").is_err());
    }

    #[test]
    fn single_resource_with_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("web.json");
        std::fs::write(
            &path,
            r#"{"id": "web", "type": "aws:ec2/instance:Instance", "properties": {"instanceType": "t3.micro"}}"#,
        )
        .unwrap();

        let items = read_estimate_items(&path, &["instanceType=m5.large".to_string()]).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].overrides["instanceType"], json!("m5.large"));
    }

    #[test]
    fn items_file_without_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(
            &path,
            r#"[{"resource": {"id": "db", "type": "aws:rds/instance:Instance"}, "overrides": {"instanceClass": "db.m5.large"}}]"#,
        )
        .unwrap();

        let items = read_estimate_items(&path, &[]).unwrap();
        assert_eq!(items[0].resource.id, "db");
        assert_eq!(items[0].overrides["instanceClass"], json!("db.m5.large"));
    }

    #[test]
    fn resource_without_changes_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("web.json");
        std::fs::write(&path, r#"{"id": "web", "type": "aws:ec2/instance:Instance"}"#).unwrap();

        let err = read_estimate_items(&path, &[]).unwrap_err();
        assert!(err.to_string().contains("No changes"));
    }

    #[test]
    fn render_projected_lists_errors_after_results() {
        use crate::engine::{ErrorKind, ResourceError};
        use crate::plugin::CostResult;

        let outcome = BatchOutcome {
            results: vec![CostResult::new("web", 10.0)],
            errors: vec![ResourceError::new("db", Some("gcp"), ErrorKind::Timeout, "deadline exceeded")],
            from_cache: false,
        };
        let output = render_projected(false, &outcome, &[], 2, &[]).unwrap();
        let results_at = output.find("web").unwrap();
        let errors_at = output.find("resource(s) failed").unwrap();
        assert!(results_at < errors_at);
        assert!(output.contains("2 dismissed or snoozed"));
    }
}
