//! Deploys application bundles into a namespace, tracks what was created and
//! tears it down again.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::cluster::model::{
    ClusterError, ClusterObject, ControlPlane, PodView, DEPLOYMENT_CONFIG_KIND, DEPLOYMENT_LABEL,
};
use crate::manifest;
use crate::wait::{self, RetryConfig, WaitConfig};

/// Tracking key the application bundle deploys under.
pub const APPLICATION_KEY: &str = "application";

/// Where the build drops the application bundle.
pub const APPLICATION_BUNDLE: &str = "target/openshift/application.yml";

// Thread safe type alias
pub type SharedControlPlane = Arc<dyn ControlPlane + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("could not read bundle {}", .path.display())]
    BundleIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("bundle {} is not valid yaml", .path.display())]
    BundleSyntax {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error(transparent)]
    TimedOut(#[from] wait::TimedOut),
    #[error("no application deployed and no name override set")]
    ApplicationUnresolved,
    #[error("no route named {0} to derive the base url from")]
    RouteMissing(String),
    #[error("could not delete {kind} {name} within {attempts} attempts")]
    DeleteExhausted {
        kind: String,
        name: String,
        attempts: u32,
        #[source]
        source: ClusterError,
    },
}

/// Drives one application through deploy, readiness, scale and cleanup.
pub struct Lifecycle {
    cluster: SharedControlPlane,
    namespace: String,
    application: Option<String>,
    application_override: Option<String>,
    base_url: Option<String>,
    created: BTreeMap<String, Vec<ClusterObject>>,
    waits: WaitConfig,
    delete_retry: RetryConfig,
}

impl Lifecycle {
    pub fn new(cluster: SharedControlPlane) -> Lifecycle {
        let namespace = cluster.namespace().to_string();
        Lifecycle {
            cluster,
            namespace,
            application: None,
            application_override: None,
            base_url: None,
            created: BTreeMap::new(),
            waits: WaitConfig::default(),
            delete_retry: RetryConfig::default(),
        }
    }

    /// Pin the application name instead of deriving it from the first
    /// deployment controller in the bundle.
    pub fn with_application_name(mut self, name: &str) -> Lifecycle {
        self.application_override = Some(name.to_string());
        self
    }

    pub fn with_waits(mut self, waits: WaitConfig) -> Lifecycle {
        self.waits = waits;
        self
    }

    pub fn with_delete_retry(mut self, retry: RetryConfig) -> Lifecycle {
        self.delete_retry = retry;
        self
    }

    /// Deploy every document of a bundle file and track what was created
    /// under `name` for later cleanup. Re-deploying under a tracked name
    /// replaces the tracked objects without deleting the earlier ones, so
    /// those earlier objects are never cleaned up.
    pub async fn deploy(
        &mut self,
        name: &str,
        bundle: &Path,
    ) -> Result<&[ClusterObject], LifecycleError> {
        let source = std::fs::read_to_string(bundle).map_err(|source| LifecycleError::BundleIo {
            path: bundle.to_path_buf(),
            source,
        })?;
        let docs =
            manifest::parse_bundle(&source).map_err(|source| LifecycleError::BundleSyntax {
                path: bundle.to_path_buf(),
                source,
            })?;
        let objects = self.cluster.apply(&self.namespace, &docs).await?;
        info!(bundle = %name, objects = objects.len(), "deployed");
        let tracked = self.created.entry(name.to_string()).or_default();
        *tracked = objects;
        Ok(tracked.as_slice())
    }

    /// Deploy the application bundle from its conventional build location.
    pub async fn deploy_application(&mut self) -> Result<String, LifecycleError> {
        self.deploy_application_from(Path::new(APPLICATION_BUNDLE))
            .await
    }

    /// Deploy an application bundle, resolve the application identity and
    /// look up the route that fronts it. The identity comes from the name
    /// override when one is set, otherwise from the first deployment
    /// controller in the bundle; the resolved name is returned.
    pub async fn deploy_application_from(
        &mut self,
        bundle: &Path,
    ) -> Result<String, LifecycleError> {
        self.deploy(APPLICATION_KEY, bundle).await?;
        let derived = self
            .created
            .get(APPLICATION_KEY)
            .into_iter()
            .flatten()
            .find(|object| object.kind == DEPLOYMENT_CONFIG_KIND)
            .map(|object| object.name.clone());
        let application = match self.application_override.clone().or(derived) {
            Some(application) => application,
            None => return Err(LifecycleError::ApplicationUnresolved),
        };
        self.application = Some(application.clone());
        let host = self
            .cluster
            .route_host(&self.namespace, &application)
            .await?
            .ok_or_else(|| LifecycleError::RouteMissing(application.clone()))?;
        let url = format!("http://{host}");
        info!(application = %application, url = %url, "application deployed");
        self.base_url = Some(url);
        Ok(application)
    }

    /// Wait until at least one pod of the application reports a Running
    /// phase. Pods are matched by name prefix, the way the platform names
    /// pods after the controller that owns them.
    pub async fn await_application_readiness_or_fail(&self) -> Result<(), LifecycleError> {
        let application = self.resolved_application()?;
        self.await_pod_readiness_or_fail(move |pod| pod.name.starts_with(&application))
            .await
    }

    /// Wait until at least one pod passing `filter` reports a Running phase.
    pub async fn await_pod_readiness_or_fail<F>(&self, filter: F) -> Result<(), LifecycleError>
    where
        F: Fn(&PodView) -> bool,
    {
        let filter = &filter;
        wait::until(&self.waits, "a running pod", || {
            let cluster = Arc::clone(&self.cluster);
            let namespace = self.namespace.clone();
            async move {
                let pods = cluster.pods(&namespace, None).await?;
                Ok::<_, LifecycleError>(pods.iter().any(|pod| filter(pod) && pod.is_running()))
            }
        })
        .await
    }

    /// Scale the application's deployment controller and wait until exactly
    /// that many labelled pods are ready. A pod that reports no Ready
    /// condition yet counts as not ready.
    pub async fn scale(&self, replicas: u32) -> Result<(), LifecycleError> {
        let application = self.resolved_application()?;
        let current = self
            .cluster
            .pods(&self.namespace, Some((DEPLOYMENT_LABEL, application.as_str())))
            .await?;
        info!(application = %application, from = current.len(), to = replicas, "scaling");
        self.cluster
            .scale_deployment_config(&self.namespace, &application, replicas)
            .await?;
        let application = &application;
        wait::until(&self.waits, "the scaled pod count", || {
            let cluster = Arc::clone(&self.cluster);
            let namespace = self.namespace.clone();
            let application = application.clone();
            async move {
                let pods = cluster
                    .pods(&namespace, Some((DEPLOYMENT_LABEL, application.as_str())))
                    .await?;
                debug!(pods = pods.len(), "labelled pods observed");
                Ok::<_, LifecycleError>(
                    pods.len() as u32 == replicas && pods.iter().all(PodView::is_ready),
                )
            }
        })
        .await
    }

    /// Delete every tracked object, bundles in name order, objects within a
    /// bundle in kind order. Each delete gets a bounded retry budget; the
    /// first object to exhaust it aborts the run. Bundles not yet visited
    /// stay tracked, the failing bundle's objects do not.
    pub async fn cleanup(&mut self) -> Result<(), LifecycleError> {
        while let Some((name, mut objects)) = self.created.pop_first() {
            objects.sort_by(|a, b| a.kind.cmp(&b.kind));
            for object in &objects {
                info!(bundle = %name, kind = %object.kind, name = %object.name, "deleting");
                let what = format!("deletion of {} {}", object.kind, object.name);
                wait::retrying(&self.delete_retry, &what, || {
                    let cluster = Arc::clone(&self.cluster);
                    let object = object.clone();
                    async move { cluster.delete(&object).await }
                })
                .await
                .map_err(|source| LifecycleError::DeleteExhausted {
                    kind: object.kind.clone(),
                    name: object.name.clone(),
                    attempts: self.delete_retry.attempts,
                    source,
                })?;
            }
        }
        Ok(())
    }

    /// Namespace every operation targets.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Application name, once resolved by a deployment or pinned up front.
    pub fn application_name(&self) -> Option<&str> {
        self.application
            .as_deref()
            .or(self.application_override.as_deref())
    }

    /// Root URL of the application route, once resolved.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Handle on the underlying control plane.
    pub fn cluster(&self) -> &SharedControlPlane {
        &self.cluster
    }

    /// Objects tracked under a deployment name, in creation order.
    pub fn tracked(&self, name: &str) -> Option<&[ClusterObject]> {
        self.created.get(name).map(Vec::as_slice)
    }

    /// Deployment names still tracked, in cleanup order.
    pub fn tracked_names(&self) -> Vec<&str> {
        self.created.keys().map(String::as_str).collect()
    }

    /// Live deployment controller of the application.
    pub async fn deployment_config(&self) -> Result<Option<ClusterObject>, LifecycleError> {
        let application = self.resolved_application()?;
        Ok(self
            .cluster
            .deployment_config(&self.namespace, &application)
            .await?)
    }

    fn resolved_application(&self) -> Result<String, LifecycleError> {
        self.application
            .clone()
            .or_else(|| self.application_override.clone())
            .ok_or(LifecycleError::ApplicationUnresolved)
    }
}
