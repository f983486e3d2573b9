//! Budget evaluation over engine output.

mod common;

use common::{ec2, engine_of, gce, MockPlugin};
use costmesh::budget::{exit_decision, BudgetEvaluator, BudgetHealth, ScopeType};
use costmesh::config::{BudgetsConfig, ScopedBudgetConfig, TagBudgetConfig};
use costmesh::engine::{CostOperation, ExecuteOptions};
use serde_json::json;

fn tagged(resource: costmesh::plugin::ResourceDescriptor, team: &str) -> costmesh::plugin::ResourceDescriptor {
    resource.with_property("tags", json!({ "team": team }))
}

#[tokio::test]
async fn provider_budgets_from_projected_costs() {
    let engine = engine_of(vec![MockPlugin::pricing("pricing")
        .with_cost("web", 80.0)
        .with_cost("vm", 30.0)]);
    let resources = vec![ec2("web"), gce("vm")];
    let options = ExecuteOptions::default();
    let outcome = engine
        .execute(&CostOperation::Projected, &resources, &options)
        .await
        .unwrap();

    let mut config = BudgetsConfig::default();
    config
        .providers
        .insert("aws".to_string(), ScopedBudgetConfig::new(100.0).with_thresholds(&[80.0]));
    config
        .providers
        .insert("gcp".to_string(), ScopedBudgetConfig::new(50.0));

    let evaluation = BudgetEvaluator::new(config)
        .unwrap()
        .evaluate(&outcome.results, &resources, &options.cancel)
        .unwrap();

    let aws = evaluation
        .scopes
        .iter()
        .find(|s| s.scope_type == ScopeType::Provider && s.scope_key == "aws")
        .unwrap();
    assert_eq!(aws.percentage, 80.0);
    assert_eq!(aws.health, BudgetHealth::Warning);

    let gcp = evaluation.scopes.iter().find(|s| s.scope_key == "gcp").unwrap();
    assert_eq!(gcp.percentage, 60.0);
    assert_eq!(gcp.health, BudgetHealth::Ok);

    assert_eq!(evaluation.overall_health, BudgetHealth::Warning);
    assert!(exit_decision(&evaluation).is_ok());
}

#[tokio::test]
async fn exceeded_tag_budget_produces_exit_signal() {
    let engine = engine_of(vec![MockPlugin::pricing("pricing")
        .with_cost("web", 120.0)
        .with_cost("batch", 10.0)]);
    let resources = vec![tagged(ec2("web"), "platform"), tagged(ec2("batch"), "data")];
    let options = ExecuteOptions::default();
    let outcome = engine
        .execute(&CostOperation::Projected, &resources, &options)
        .await
        .unwrap();

    let config = BudgetsConfig {
        global: Some(ScopedBudgetConfig::new(1000.0)),
        tags: vec![TagBudgetConfig {
            selector: "team:platform".to_string(),
            priority: 0,
            budget: ScopedBudgetConfig::new(100.0).with_exit(true, 3),
        }],
        ..Default::default()
    };

    let evaluation = BudgetEvaluator::new(config)
        .unwrap()
        .evaluate(&outcome.results, &resources, &options.cancel)
        .unwrap();

    let global = evaluation
        .scopes
        .iter()
        .find(|s| s.scope_type == ScopeType::Global)
        .unwrap();
    assert_eq!(global.spend, 130.0);
    assert_eq!(global.health, BudgetHealth::Ok);

    let team = evaluation
        .scopes
        .iter()
        .find(|s| s.scope_type == ScopeType::Tag)
        .unwrap();
    assert_eq!(team.spend, 120.0);
    assert_eq!(team.health, BudgetHealth::Exceeded);
    assert_eq!(evaluation.overall_health, BudgetHealth::Exceeded);

    let signal = exit_decision(&evaluation).unwrap_err();
    assert_eq!(signal.exit_code, 3);
    assert!(signal.reason.contains("team:platform"));
}

#[tokio::test]
async fn unpriced_resources_contribute_nothing() {
    let engine = engine_of(vec![MockPlugin::pricing("pricing").with_cost("web", 40.0)]);
    let resources = vec![ec2("web"), ec2("unpriced")];
    let options = ExecuteOptions::default();
    let outcome = engine
        .execute(&CostOperation::Projected, &resources, &options)
        .await
        .unwrap();
    assert_eq!(outcome.errors.len(), 1);

    let config = BudgetsConfig {
        global: Some(ScopedBudgetConfig::new(100.0)),
        ..Default::default()
    };
    let evaluation = BudgetEvaluator::new(config)
        .unwrap()
        .evaluate(&outcome.results, &resources, &options.cancel)
        .unwrap();
    assert_eq!(evaluation.scopes[0].spend, 40.0);
    assert_eq!(evaluation.scopes[0].health, BudgetHealth::Ok);
}
