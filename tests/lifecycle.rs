use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use booster_harness::cluster::stubs::{Offline, Scripted};
use booster_harness::lifecycle::APPLICATION_KEY;
use booster_harness::{ClusterError, Lifecycle, LifecycleError, PodView, RetryConfig, WaitConfig};

const APPLICATION_BUNDLE: &str = "manifests/application.yml";
const DATABASE_BUNDLE: &str = "manifests/database.yml";

fn fast_waits() -> WaitConfig {
    WaitConfig {
        bound: Duration::from_millis(50),
        interval: Duration::from_millis(1),
    }
}

fn fast_retry() -> RetryConfig {
    RetryConfig {
        attempts: 3,
        backoff: Duration::from_millis(1),
    }
}

fn harness(cluster: &Arc<Scripted>) -> Lifecycle {
    Lifecycle::new(cluster.clone())
        .with_waits(fast_waits())
        .with_delete_retry(fast_retry())
}

#[tokio::test]
async fn deploy_tracks_created_objects() {
    let cluster = Arc::new(Scripted::new("test-project"));
    let mut lifecycle = harness(&cluster);

    let objects = lifecycle
        .deploy("database", Path::new(DATABASE_BUNDLE))
        .await
        .unwrap();

    let kinds: Vec<&str> = objects.iter().map(|object| object.kind.as_str()).collect();
    assert_eq!(kinds, ["Service", "DeploymentConfig"]);
    assert!(objects.iter().all(|object| object.name == "inventory-db"));
    assert_eq!(objects[0].namespace.as_deref(), Some("test-project"));
}

#[tokio::test]
async fn application_bundle_expands_the_list_wrapper() {
    let cluster = Arc::new(Scripted::new("test-project"));
    let mut lifecycle = harness(&cluster);

    let objects = lifecycle
        .deploy("application", Path::new(APPLICATION_BUNDLE))
        .await
        .unwrap();

    let kinds: Vec<&str> = objects.iter().map(|object| object.kind.as_str()).collect();
    assert_eq!(kinds, ["Service", "DeploymentConfig", "Route"]);
}

#[tokio::test]
async fn deploy_application_resolves_identity_and_route() {
    let cluster = Arc::new(Scripted::new("test-project"));
    cluster.set_route("inventory-api", "inventory-api.apps.example.test");
    let mut lifecycle = harness(&cluster);

    let application = lifecycle
        .deploy_application_from(Path::new(APPLICATION_BUNDLE))
        .await
        .unwrap();

    assert_eq!(application, "inventory-api");
    assert_eq!(lifecycle.application_name(), Some("inventory-api"));
    assert_eq!(
        lifecycle.base_url(),
        Some("http://inventory-api.apps.example.test")
    );
    let config = lifecycle.deployment_config().await.unwrap();
    assert_eq!(
        config.map(|object| object.name).as_deref(),
        Some("inventory-api")
    );
}

#[tokio::test]
async fn application_name_override_wins() {
    let cluster = Arc::new(Scripted::new("test-project"));
    cluster.set_route("renamed", "renamed.apps.example.test");
    let mut lifecycle = harness(&cluster).with_application_name("renamed");

    let application = lifecycle
        .deploy_application_from(Path::new(APPLICATION_BUNDLE))
        .await
        .unwrap();

    assert_eq!(application, "renamed");
    assert_eq!(lifecycle.application_name(), Some("renamed"));
    assert_eq!(lifecycle.base_url(), Some("http://renamed.apps.example.test"));
}

#[tokio::test]
async fn missing_route_fails_the_application_deployment() {
    let cluster = Arc::new(Scripted::new("test-project"));
    let mut lifecycle = harness(&cluster);

    let err = lifecycle
        .deploy_application_from(Path::new(APPLICATION_BUNDLE))
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::RouteMissing(name) if name == "inventory-api"));
    // Identity is resolved and objects stay tracked even without a route.
    assert_eq!(lifecycle.application_name(), Some("inventory-api"));
    assert!(lifecycle.tracked(APPLICATION_KEY).is_some());
}

#[tokio::test]
async fn readiness_returns_once_a_pod_runs() {
    let cluster = Arc::new(Scripted::new("test-project"));
    cluster.set_route("inventory-api", "inventory-api.apps.example.test");
    cluster.push_pod_batch(vec![
        PodView::named("inventory-api-1-build").with_phase("Pending")
    ]);
    cluster.push_pod_batch(vec![
        PodView::named("inventory-api-1-x7kq2").with_phase("Running")
    ]);
    let mut lifecycle = harness(&cluster);
    lifecycle
        .deploy_application_from(Path::new(APPLICATION_BUNDLE))
        .await
        .unwrap();

    lifecycle.await_application_readiness_or_fail().await.unwrap();

    assert_eq!(cluster.remaining_pod_batches(), 1);
}

#[tokio::test]
async fn pod_readiness_respects_the_filter() {
    let cluster = Arc::new(Scripted::new("test-project"));
    cluster.push_pod_batch(vec![
        PodView::named("inventory-db-1-p9s8d").with_phase("Running"),
        PodView::named("inventory-api-1-deploy").with_phase("Pending"),
    ]);
    let lifecycle = harness(&cluster);

    lifecycle
        .await_pod_readiness_or_fail(|pod| pod.name.starts_with("inventory-db"))
        .await
        .unwrap();

    let err = lifecycle
        .await_pod_readiness_or_fail(|pod| pod.name.starts_with("inventory-api"))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::TimedOut(_)));
}

#[tokio::test]
async fn readiness_gives_up_after_the_bound() {
    let cluster = Arc::new(Scripted::new("test-project"));
    cluster.set_route("inventory-api", "inventory-api.apps.example.test");
    let mut lifecycle = harness(&cluster);
    lifecycle
        .deploy_application_from(Path::new(APPLICATION_BUNDLE))
        .await
        .unwrap();

    let err = lifecycle
        .await_application_readiness_or_fail()
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::TimedOut(_)));
}

#[tokio::test]
async fn scale_waits_for_the_exact_ready_count() {
    let cluster = Arc::new(Scripted::new("test-project"));
    cluster.set_route("inventory-api", "inventory-api.apps.example.test");
    let labelled = |suffix: &str| {
        PodView::named(&format!("inventory-api-1-{suffix}"))
            .with_label("deploymentconfig", "inventory-api")
            .with_phase("Running")
    };
    // One batch for the pre-scale count, then three poll rounds: still three
    // pods, two pods with one not yet ready, finally two ready pods.
    cluster.push_pod_batch(vec![
        labelled("a").with_ready(true),
        labelled("b").with_ready(true),
        labelled("c").with_ready(true),
    ]);
    cluster.push_pod_batch(vec![
        labelled("a").with_ready(true),
        labelled("b").with_ready(true),
        labelled("c").with_ready(true),
    ]);
    cluster.push_pod_batch(vec![labelled("a").with_ready(true), labelled("b")]);
    cluster.push_pod_batch(vec![
        labelled("a").with_ready(true),
        labelled("b").with_ready(true),
    ]);
    let mut lifecycle = harness(&cluster);
    lifecycle
        .deploy_application_from(Path::new(APPLICATION_BUNDLE))
        .await
        .unwrap();

    lifecycle.scale(2).await.unwrap();

    assert_eq!(cluster.scale_requests(), [("inventory-api".to_string(), 2)]);
    assert_eq!(cluster.remaining_pod_batches(), 1);
}

#[tokio::test]
async fn scale_requires_a_resolved_application() {
    let cluster = Arc::new(Scripted::new("test-project"));
    let lifecycle = harness(&cluster);

    let err = lifecycle.scale(2).await.unwrap_err();

    assert!(matches!(err, LifecycleError::ApplicationUnresolved));
    assert!(cluster.scale_requests().is_empty());
}

#[tokio::test]
async fn cleanup_deletes_bundles_by_name_and_objects_by_kind() {
    let cluster = Arc::new(Scripted::new("test-project"));
    let mut lifecycle = harness(&cluster);
    lifecycle
        .deploy("b-app", Path::new(APPLICATION_BUNDLE))
        .await
        .unwrap();
    lifecycle
        .deploy("a-db", Path::new(DATABASE_BUNDLE))
        .await
        .unwrap();

    lifecycle.cleanup().await.unwrap();

    let recorded = cluster.delete_attempts();
    let attempts: Vec<(&str, &str)> = recorded
        .iter()
        .map(|(kind, name)| (kind.as_str(), name.as_str()))
        .collect();
    assert_eq!(
        attempts,
        [
            ("DeploymentConfig", "inventory-db"),
            ("Service", "inventory-db"),
            ("DeploymentConfig", "inventory-api"),
            ("Route", "inventory-api"),
            ("Service", "inventory-api"),
        ]
    );
}

#[tokio::test]
async fn cleanup_untracks_everything_and_is_idempotent() {
    let cluster = Arc::new(Scripted::new("test-project"));
    let mut lifecycle = harness(&cluster);
    lifecycle
        .deploy("database", Path::new(DATABASE_BUNDLE))
        .await
        .unwrap();

    lifecycle.cleanup().await.unwrap();
    assert!(lifecycle.tracked_names().is_empty());

    let after_first = cluster.delete_attempts().len();
    lifecycle.cleanup().await.unwrap();
    assert_eq!(cluster.delete_attempts().len(), after_first);
}

#[tokio::test]
async fn transient_delete_failures_are_retried() {
    let cluster = Arc::new(Scripted::new("test-project"));
    cluster.fail_deletes("Service", "inventory-db", 2);
    let mut lifecycle = harness(&cluster);
    lifecycle
        .deploy("database", Path::new(DATABASE_BUNDLE))
        .await
        .unwrap();

    lifecycle.cleanup().await.unwrap();

    // One attempt for the deployment controller, three for the service.
    assert_eq!(cluster.delete_attempts().len(), 4);
    assert!(lifecycle.tracked_names().is_empty());
}

#[tokio::test]
async fn exhausted_deletes_abort_cleanup_and_name_the_object() {
    let cluster = Arc::new(Scripted::new("test-project"));
    cluster.fail_deletes("DeploymentConfig", "inventory-db", 3);
    let mut lifecycle = harness(&cluster);
    lifecycle
        .deploy("b-app", Path::new(APPLICATION_BUNDLE))
        .await
        .unwrap();
    lifecycle
        .deploy("a-db", Path::new(DATABASE_BUNDLE))
        .await
        .unwrap();

    let err = lifecycle.cleanup().await.unwrap_err();

    match err {
        LifecycleError::DeleteExhausted {
            kind,
            name,
            attempts,
            ..
        } => {
            assert_eq!(kind, "DeploymentConfig");
            assert_eq!(name, "inventory-db");
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    // Three failed attempts on the first object and nothing after it.
    assert_eq!(cluster.delete_attempts().len(), 3);
    // The failing bundle is no longer tracked, later bundles still are.
    assert_eq!(lifecycle.tracked_names(), ["b-app"]);
}

#[tokio::test]
async fn redeploy_under_a_tracked_name_orphans_the_earlier_objects() {
    let cluster = Arc::new(Scripted::new("test-project"));
    let mut lifecycle = harness(&cluster);
    lifecycle
        .deploy("stack", Path::new(DATABASE_BUNDLE))
        .await
        .unwrap();
    lifecycle
        .deploy("stack", Path::new(APPLICATION_BUNDLE))
        .await
        .unwrap();

    assert_eq!(lifecycle.tracked("stack").map(|objects| objects.len()), Some(3));

    lifecycle.cleanup().await.unwrap();

    // Only the second bundle is deleted; the database objects deployed
    // first under the same name are left behind.
    let attempts = cluster.delete_attempts();
    assert_eq!(attempts.len(), 3);
    assert!(attempts.iter().all(|(_, name)| name == "inventory-api"));
}

#[tokio::test]
async fn unreachable_control_plane_surfaces_the_connection_error() {
    let mut lifecycle = Lifecycle::new(Arc::new(Offline))
        .with_waits(fast_waits())
        .with_delete_retry(fast_retry());

    let err = lifecycle
        .deploy("database", Path::new(DATABASE_BUNDLE))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::Cluster(ClusterError::Connection(_))
    ));
}

#[tokio::test]
async fn missing_bundle_file_reports_the_path() {
    let cluster = Arc::new(Scripted::new("test-project"));
    let mut lifecycle = harness(&cluster);

    let err = lifecycle
        .deploy("nope", Path::new("manifests/does-not-exist.yml"))
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::BundleIo { .. }));
    assert!(err.to_string().contains("does-not-exist.yml"));
}

#[tokio::test]
async fn document_without_a_name_is_rejected() {
    let cluster = Arc::new(Scripted::new("test-project"));
    let mut lifecycle = harness(&cluster);

    let err = lifecycle
        .deploy("broken", Path::new("tests/fixtures/incomplete.yml"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::Cluster(ClusterError::Malformed(_))
    ));
    assert!(lifecycle.tracked("broken").is_none());
}

#[tokio::test]
async fn document_without_an_api_version_is_rejected() {
    let cluster = Arc::new(Scripted::new("test-project"));
    let mut lifecycle = harness(&cluster);

    let err = lifecycle
        .deploy("broken", Path::new("tests/fixtures/unversioned.yml"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::Cluster(ClusterError::Malformed(_))
    ));
    assert!(err.to_string().contains("apiVersion"));
    assert!(lifecycle.tracked("broken").is_none());
}
