//! `budget check` command handler

use crate::budget::{exit_decision, BudgetEvaluation, BudgetEvaluator, BudgetExitSignal};
use crate::cli::context::read_resources;
use crate::cli::output::{format_budget_table, format_resource_errors, to_json};
use crate::cli::{BudgetCheckArgs, Context};
use crate::engine::{BatchOutcome, CostOperation};
use serde_json::json;

/// Rendered budget status plus the exit signal, if any scope demands one.
#[derive(Debug)]
pub struct BudgetCheckOutput {
    pub rendered: String,
    pub signal: Option<BudgetExitSignal>,
}

/// Handle `costmesh budget check`
///
/// Prices the resource set with projected costs, evaluates every configured
/// scope and decides the exit status. Rendering always happens first; the
/// caller turns the signal into the process exit code.
pub async fn handle_budget_check(
    args: &BudgetCheckArgs,
    ctx: &Context,
) -> anyhow::Result<BudgetCheckOutput> {
    if ctx.config.budgets.is_empty() {
        anyhow::bail!("No budgets configured: add a [budgets] section to the configuration");
    }
    let evaluator = BudgetEvaluator::new(ctx.config.budgets.clone())?;
    let resources = read_resources(&args.resources)?;

    let (outcome, evaluation) = ctx
        .with_engine(|engine| async move {
            let options = ctx.options();
            let outcome = engine
                .execute(&CostOperation::Projected, &resources, &options)
                .await?;
            let evaluation = evaluator.evaluate(&outcome.results, &resources, &options.cancel)?;
            Ok((outcome, evaluation))
        })
        .await?;

    let signal = if args.warn_only {
        None
    } else {
        exit_decision(&evaluation).err()
    };

    Ok(BudgetCheckOutput {
        rendered: render(ctx.json, &outcome, &evaluation)?,
        signal,
    })
}

fn render(json: bool, outcome: &BatchOutcome, evaluation: &BudgetEvaluation) -> anyhow::Result<String> {
    if json {
        return to_json(&json!({
            "budgets": evaluation,
            "total_monthly": outcome.total_monthly(),
            "errors": outcome.errors,
        }));
    }

    let mut output = format_budget_table(evaluation);
    if !outcome.errors.is_empty() {
        output.push_str("\n\nSpend excludes resources that could not be priced.\n");
        output.push_str(&format_resource_errors(&outcome.errors));
    }
    Ok(output)
}
