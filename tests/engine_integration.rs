//! Engine dispatch tests: partitioning, partial failure, caching,
//! deadlines and recommendation correlation.

mod common;

use common::{ec2, engine_of, engine_with, gce, recommendation, MockPlugin};
use costmesh::cache::Cache;
use costmesh::config::{PatternConfig, RoutingConfig, RoutingRule};
use costmesh::engine::{attach_recommendations, CostOperation, ErrorKind, ExecuteOptions};
use costmesh::plugin::PluginError;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn split_routing() -> RoutingConfig {
    RoutingConfig {
        rules: vec![
            RoutingRule::new("aws", vec![PatternConfig::glob("aws:*")]),
            RoutingRule::new("gcp", vec![PatternConfig::glob("gcp:*")]),
        ],
    }
}

#[tokio::test]
async fn failing_partition_does_not_drop_other_results() {
    let aws = MockPlugin::pricing("aws").failing(PluginError::Upstream {
        status: 503,
        message: "throttled".to_string(),
    });
    let gcp = MockPlugin::pricing("gcp").with_cost("vm-1", 30.0).with_cost("vm-2", 12.0);
    let engine = engine_with(vec![aws, gcp], &split_routing(), Cache::disabled());

    let resources = vec![ec2("web"), gce("vm-1"), ec2("api"), gce("vm-2")];
    let outcome = engine
        .execute(&CostOperation::Projected, &resources, &ExecuteOptions::default())
        .await
        .unwrap();

    let priced: Vec<&str> = outcome.results.iter().map(|r| r.resource_id.as_str()).collect();
    assert_eq!(priced, vec!["vm-1", "vm-2"]);
    assert!(outcome.results.iter().all(|r| r.plugin == "gcp"));

    let failed: Vec<&str> = outcome.errors.iter().map(|e| e.resource_id.as_str()).collect();
    assert_eq!(failed, vec!["web", "api"]);
    assert!(outcome
        .errors
        .iter()
        .all(|e| e.kind == ErrorKind::Plugin && e.plugin.as_deref() == Some("aws")));
    assert_eq!(outcome.results.len() + outcome.errors.len(), resources.len());
}

#[tokio::test]
async fn resource_missing_from_response_is_reported() {
    let engine = engine_of(vec![MockPlugin::pricing("aws").with_cost("web", 10.0)]);

    let outcome = engine
        .execute(
            &CostOperation::Projected,
            &[ec2("web"), ec2("ghost")],
            &ExecuteOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.errors[0].resource_id, "ghost");
    assert_eq!(outcome.errors[0].kind, ErrorKind::MissingResult);
}

#[tokio::test]
async fn automatic_routing_falls_through_to_next_capable_plugin() {
    let broken = MockPlugin::pricing("broken").failing(PluginError::Network("refused".to_string()));
    let backup = MockPlugin::pricing("backup").with_cost("web", 20.0);
    let engine = engine_of(vec![broken, backup]);

    let outcome = engine
        .execute(&CostOperation::Projected, &[ec2("web")], &ExecuteOptions::default())
        .await
        .unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.results[0].plugin, "backup");
}

#[tokio::test]
async fn plugin_request_timeout_falls_through_to_next_plugin() {
    let slow = MockPlugin::pricing("slow").failing(PluginError::Timeout(5000));
    let slow_calls = slow.calls.clone();
    let backup = MockPlugin::pricing("backup").with_cost("web", 20.0);
    let backup_calls = backup.calls.clone();
    let engine = engine_of(vec![slow, backup]);

    let outcome = engine
        .execute(&CostOperation::Projected, &[ec2("web")], &ExecuteOptions::default())
        .await
        .unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.results[0].plugin, "backup");
    assert_eq!(slow_calls.load(Ordering::SeqCst), 1);
    assert_eq!(backup_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn passed_deadline_stops_the_chain() {
    let slow = MockPlugin::pricing("slow")
        .with_cost("web", 1.0)
        .with_delay(Duration::from_secs(30));
    let backup = MockPlugin::pricing("backup").with_cost("web", 20.0);
    let backup_calls = backup.calls.clone();
    let engine = engine_of(vec![slow, backup]);

    let options = ExecuteOptions::default().with_timeout(Some(Duration::from_millis(100)));
    let outcome = engine
        .execute(&CostOperation::Projected, &[ec2("web")], &options)
        .await
        .unwrap();

    assert!(outcome.results.is_empty());
    assert_eq!(outcome.errors[0].kind, ErrorKind::Timeout);
    assert_eq!(outcome.errors[0].plugin.as_deref(), Some("slow"));
    assert_eq!(backup_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn second_identical_query_is_served_from_cache() {
    let dir = TempDir::new().unwrap();
    let plugin = MockPlugin::pricing("aws").with_cost("web", 42.0);
    let calls = plugin.calls.clone();
    let cache = Cache::new(dir.path(), true, 3600, 10);
    let engine = engine_with(vec![plugin], &RoutingConfig::default(), cache);
    let resources = vec![ec2("web")];

    let first = engine
        .execute(&CostOperation::Projected, &resources, &ExecuteOptions::default())
        .await
        .unwrap();
    let second = engine
        .execute(&CostOperation::Projected, &resources, &ExecuteOptions::default())
        .await
        .unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(first.results, second.results);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Bypassing the cache always reaches the plugin.
    engine
        .execute(
            &CostOperation::Projected,
            &resources,
            &ExecuteOptions::default().without_cache(),
        )
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn incomplete_batches_are_not_cached() {
    let dir = TempDir::new().unwrap();
    let plugin = MockPlugin::pricing("aws").with_cost("web", 42.0);
    let calls = plugin.calls.clone();
    let engine = engine_with(
        vec![plugin],
        &RoutingConfig::default(),
        Cache::new(dir.path(), true, 3600, 10),
    );
    let resources = vec![ec2("web"), ec2("ghost")];

    for _ in 0..2 {
        let outcome = engine
            .execute(&CostOperation::Projected, &resources, &ExecuteOptions::default())
            .await
            .unwrap();
        assert!(!outcome.from_cache);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn deadline_marks_slow_partition_as_timed_out() {
    let slow = MockPlugin::pricing("aws")
        .with_cost("web", 1.0)
        .with_delay(Duration::from_secs(30));
    let fast = MockPlugin::pricing("gcp").with_cost("vm-1", 2.0);
    let engine = engine_with(vec![slow, fast], &split_routing(), Cache::disabled());

    let options = ExecuteOptions::default().with_timeout(Some(Duration::from_millis(100)));
    let outcome = engine
        .execute(&CostOperation::Projected, &[ec2("web"), gce("vm-1")], &options)
        .await
        .unwrap();

    assert_eq!(outcome.results[0].resource_id, "vm-1");
    assert_eq!(outcome.errors[0].resource_id, "web");
    assert_eq!(outcome.errors[0].kind, ErrorKind::Timeout);
}

#[tokio::test]
async fn cancellation_during_dispatch_marks_resources_cancelled() {
    let slow = MockPlugin::pricing("aws")
        .with_cost("web", 1.0)
        .with_delay(Duration::from_secs(30));
    let engine = engine_of(vec![slow]);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let options = ExecuteOptions::default().with_cancel(cancel);
    let outcome = engine
        .execute(&CostOperation::Projected, &[ec2("web")], &options)
        .await
        .unwrap();

    assert!(outcome.results.is_empty());
    assert_eq!(outcome.errors[0].kind, ErrorKind::Cancelled);
}

#[tokio::test]
async fn recommendations_merge_by_cloud_native_id() {
    let advisor = MockPlugin::new("advisor", &[])
        .with_recommendation(recommendation("rec-1", "i-0abc", 15.0))
        .with_recommendation(recommendation("rec-2", "", 5.0))
        .with_recommendation(recommendation("rec-3", "i-unknown", 1.0));
    let pricing = MockPlugin::pricing("aws").with_cost("web", 70.0);
    let engine = engine_of(vec![pricing, advisor]);

    let resources = vec![ec2("web").with_property("cloudId", "i-0abc")];
    let options = ExecuteOptions::default();

    let background = engine.spawn_recommendations(resources.clone(), options.clone());
    let mut outcome = engine
        .execute(&CostOperation::Projected, &resources, &options)
        .await
        .unwrap();
    let fetched = background.join().await.unwrap();
    assert!(fetched.errors.is_empty());
    assert!(fetched.recommendations.iter().all(|r| r.plugin == "advisor"));

    let unattached = attach_recommendations(&mut outcome.results, &resources, fetched.recommendations);

    let attached: Vec<&str> = outcome.results[0]
        .recommendations
        .iter()
        .map(|r| r.id.as_str())
        .collect();
    assert_eq!(attached, vec!["rec-1"]);
    let leftover: Vec<&str> = unattached.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(leftover, vec!["rec-3"]);
}

#[tokio::test]
async fn failing_recommendation_plugin_is_reported_not_fatal() {
    let advisor = MockPlugin::new("advisor", &[])
        .with_recommendation(recommendation("rec-1", "web", 1.0))
        .failing(PluginError::Network("connection reset".to_string()));
    let engine = engine_of(vec![advisor]);

    let outcome = engine
        .recommendations(&[ec2("web")], &ExecuteOptions::default())
        .await
        .unwrap();

    assert!(outcome.recommendations.is_empty());
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].plugin, "advisor");
}
