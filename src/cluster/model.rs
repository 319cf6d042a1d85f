use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

/// Kind string of the platform's deployment controller. The first object of
/// this kind in the application bundle names the application unless an
/// override is configured.
pub const DEPLOYMENT_CONFIG_KIND: &str = "DeploymentConfig";

/// Label the platform stamps on every pod owned by a deployment controller.
pub const DEPLOYMENT_LABEL: &str = "deploymentconfig";

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("could not reach the control plane: {0}")]
    Connection(String),

    #[error("manifest document is not a cluster object: {0}")]
    Malformed(String),

    #[error("control plane rejected {kind} {name}: {reason}")]
    Rejected {
        kind: String,
        name: String,
        reason: String,
    },

    #[error("no api on this cluster serves {0}")]
    UnknownKind(String),

    #[error("control plane request failed: {0}")]
    Api(String),
}

/// A live object as returned by the control plane after create-or-replace.
///
/// Only `kind` and `name` are interpreted here, for logging and for the
/// deletion ordering; the body rides along uninterpreted so deletion can
/// address the exact object that was created.
#[derive(Clone, Debug)]
pub struct ClusterObject {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    pub body: Value,
}

/// The slice of pod state read on every poll tick.
#[derive(Clone, Debug, Default)]
pub struct PodView {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub phase: Option<String>,
    /// `None` while the pod reports no Ready condition at all.
    pub ready: Option<bool>,
}

impl PodView {
    pub fn named(name: &str) -> PodView {
        PodView {
            name: name.to_string(),
            ..PodView::default()
        }
    }

    pub fn with_phase(mut self, phase: &str) -> PodView {
        self.phase = Some(phase.to_string());
        self
    }

    pub fn with_label(mut self, key: &str, value: &str) -> PodView {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_ready(mut self, ready: bool) -> PodView {
        self.ready = Some(ready);
        self
    }

    pub fn is_running(&self) -> bool {
        self.phase
            .as_deref()
            .map(|phase| phase.eq_ignore_ascii_case("running"))
            .unwrap_or(false)
    }

    /// A pod without a Ready condition is not ready yet.
    pub fn is_ready(&self) -> bool {
        self.ready == Some(true)
    }
}

/// Everything the lifecycle needs from the cluster.
#[async_trait]
pub trait ControlPlane {
    /// Ambient namespace of this connection. Deployments target it unless a
    /// manifest names its own.
    fn namespace(&self) -> &str;

    /// Create-or-replace every document of a bundle, returning the live
    /// objects in submission order.
    async fn apply(
        &self,
        namespace: &str,
        docs: &[Value],
    ) -> Result<Vec<ClusterObject>, ClusterError>;

    /// All pods in the namespace, optionally narrowed to one label equality.
    async fn pods(
        &self,
        namespace: &str,
        selector: Option<(&str, &str)>,
    ) -> Result<Vec<PodView>, ClusterError>;

    /// The named deployment controller, if it exists.
    async fn deployment_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ClusterObject>, ClusterError>;

    /// Ask the named deployment controller for a new replica count. Returns
    /// as soon as the control plane accepts the request; pods catch up later.
    async fn scale_deployment_config(
        &self,
        namespace: &str,
        name: &str,
        replicas: u32,
    ) -> Result<(), ClusterError>;

    /// External hostname of the named route, if the route exists.
    async fn route_host(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<String>, ClusterError>;

    /// Delete one object with zero grace period. A deletion the control
    /// plane has accepted but not finished counts as success; its garbage
    /// collection owns the rest.
    async fn delete(&self, object: &ClusterObject) -> Result<(), ClusterError>;
}
