//! Verification flow: metrics tick to a terminal state, then the
//! affected release target is re-evaluated.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use keel::types::{
    Deployment, DeploymentVersion, Environment, ReleaseTargetKey, Resource, Selector, System,
    VersionStatus,
};
use keel::{EngineBuilder, MetricSpec, StaticProvider, Verification, VerificationStatus};

fn metric(name: &str, success_threshold: Option<usize>) -> MetricSpec {
    MetricSpec {
        name: name.into(),
        provider: "static".into(),
        config: serde_json::Value::Null,
        count: 1,
        success_threshold,
        failure_threshold: None,
        interval: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn test_terminal_metric_reevaluates_target() {
    let mut engine = EngineBuilder::new()
        .with_metric_provider("static", Arc::new(StaticProvider::passing()))
        .build();

    engine
        .upsert_system(System {
            id: "sys-1".into(),
            name: "platform".into(),
            workspace_id: "ws-1".into(),
        })
        .unwrap();
    engine
        .upsert_environment(Environment {
            id: "env-1".into(),
            name: "production".into(),
            system_id: "sys-1".into(),
            resource_selector: None,
        })
        .unwrap();
    engine
        .upsert_deployment(Deployment {
            id: "dep-1".into(),
            name: "web".into(),
            slug: "web".into(),
            system_id: "sys-1".into(),
            resource_selector: Some(Selector::expr("true")),
            job_agent_config: serde_json::Value::Null,
        })
        .unwrap();
    engine
        .upsert_resource(Resource {
            id: "res-1".into(),
            name: "node-1".into(),
            kind: "Node".into(),
            identifier: "test/node-1".into(),
            workspace_id: "ws-1".into(),
            metadata: BTreeMap::new(),
            config: serde_json::Value::Null,
            provider_id: None,
        })
        .unwrap();
    engine
        .upsert_version(DeploymentVersion {
            id: "v-1".into(),
            deployment_id: "dep-1".into(),
            tag: "v1.0.0".into(),
            status: VersionStatus::Ready,
            created_at: Utc::now(),
            metadata: BTreeMap::new(),
        })
        .unwrap();

    let mut reconciler = engine.reconciler().unwrap();
    let cancel = CancellationToken::new();
    reconciler.drain(&cancel).await;
    assert_eq!(engine.desired_releases().len(), 1);

    engine
        .register_verification(Verification {
            id: "ver-1".into(),
            release_target: ReleaseTargetKey::new("env-1", "dep-1", "res-1"),
            metrics: vec![metric("smoke", Some(1))],
        })
        .unwrap();

    // One sample suffices (success_threshold = 1): the tick goes
    // terminal and fans a desired-release item back out.
    reconciler.drain(&cancel).await;

    assert_eq!(
        engine.verification_status("ver-1"),
        Some(VerificationStatus::Passed)
    );
    assert_eq!(engine.desired_releases().len(), 1);
}

#[tokio::test]
async fn test_failed_metric_aggregates_failed() {
    let mut engine = EngineBuilder::new()
        .with_metric_provider("static", Arc::new(StaticProvider::failing()))
        .build();

    engine
        .register_verification(Verification {
            id: "ver-1".into(),
            release_target: ReleaseTargetKey::new("env-1", "dep-1", "res-1"),
            metrics: vec![metric("smoke", None)],
        })
        .unwrap();

    let mut reconciler = engine.reconciler().unwrap();
    let cancel = CancellationToken::new();
    reconciler.drain(&cancel).await;

    assert_eq!(
        engine.verification_status("ver-1"),
        Some(VerificationStatus::Failed)
    );
}
