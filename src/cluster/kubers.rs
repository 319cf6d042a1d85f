use async_trait::async_trait;

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, DynamicObject, GroupVersionKind, ListParams, Patch, PatchParams};
use kube::discovery::{Discovery, Scope};
use kube::ResourceExt;
use kube_client::config::KubeConfigOptions;
use kube_client::{Client, Config};
use serde_json::Value;

use crate::cluster::model::{
    ClusterError, ClusterObject, ControlPlane, PodView, DEPLOYMENT_CONFIG_KIND,
};

/// Field manager name stamped on every server-side apply.
const FIELD_MANAGER: &str = "booster-harness";

/// Control plane backed by a live API server via kube-rs.
pub struct KubeRsBased {
    client: Client,
    discovery: Discovery,
    namespace: String,
}

impl KubeRsBased {
    /// Connect through the ambient kubeconfig, or through a named context
    /// when one is given. Runs API discovery once so later calls can route
    /// any kind the server knows about.
    pub async fn connect(context: Option<String>) -> Result<KubeRsBased, ClusterError> {
        let config = match context {
            Some(context) => {
                let context_options = KubeConfigOptions {
                    context: Some(context),
                    ..Default::default()
                };
                Config::from_kubeconfig(&context_options)
                    .await
                    .map_err(|err| ClusterError::Connection(err.to_string()))?
            }
            None => Config::infer()
                .await
                .map_err(|err| ClusterError::Connection(err.to_string()))?,
        };
        let namespace = config.default_namespace.clone();
        let client =
            Client::try_from(config).map_err(|err| ClusterError::Connection(err.to_string()))?;
        let discovery = Discovery::new(client.clone())
            .run()
            .await
            .map_err(|err| ClusterError::Connection(err.to_string()))?;
        Ok(KubeRsBased {
            client,
            discovery,
            namespace,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn dynamic_api(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
    ) -> Result<Api<DynamicObject>, ClusterError> {
        let (resource, capabilities) = self.discovery.resolve_gvk(gvk).ok_or_else(|| {
            ClusterError::UnknownKind(format!("{} ({})", gvk.kind, api_version_of(gvk)))
        })?;
        Ok(match capabilities.scope {
            Scope::Cluster => Api::all_with(self.client.clone(), &resource),
            Scope::Namespaced => Api::namespaced_with(self.client.clone(), namespace, &resource),
        })
    }
}

#[async_trait]
impl ControlPlane for KubeRsBased {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn apply(
        &self,
        namespace: &str,
        docs: &[Value],
    ) -> Result<Vec<ClusterObject>, ClusterError> {
        let mut created = Vec::with_capacity(docs.len());
        for doc in docs {
            let gvk = doc_gvk(doc)?;
            let object: DynamicObject = serde_json::from_value(doc.clone())
                .map_err(|err| ClusterError::Malformed(err.to_string()))?;
            let name = object.metadata.name.clone().ok_or_else(|| {
                ClusterError::Malformed(format!("{} document has no metadata.name", gvk.kind))
            })?;
            let target = object.metadata.namespace.as_deref().unwrap_or(namespace);
            let api = self.dynamic_api(&gvk, target)?;
            let applied = api
                .patch(
                    &name,
                    &PatchParams::apply(FIELD_MANAGER).force(),
                    &Patch::Apply(&object),
                )
                .await
                .map_err(|err| ClusterError::Rejected {
                    kind: gvk.kind.clone(),
                    name: name.clone(),
                    reason: err.to_string(),
                })?;
            created.push(ClusterObject {
                api_version: api_version_of(&gvk),
                kind: gvk.kind.clone(),
                name: applied.name_any(),
                namespace: applied.namespace(),
                body: doc.clone(),
            });
        }
        Ok(created)
    }

    async fn pods(
        &self,
        namespace: &str,
        selector: Option<(&str, &str)>,
    ) -> Result<Vec<PodView>, ClusterError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let mut params = ListParams::default();
        if let Some((label, value)) = selector {
            params = params.labels(&format!("{label}={value}"));
        }
        let pods = api
            .list(&params)
            .await
            .map_err(|err| ClusterError::Api(err.to_string()))?;
        Ok(pods.items.iter().map(pod_view).collect())
    }

    async fn deployment_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ClusterObject>, ClusterError> {
        let gvk = deployment_config_gvk();
        let api = self.dynamic_api(&gvk, namespace)?;
        let found = api
            .get_opt(name)
            .await
            .map_err(|err| ClusterError::Api(err.to_string()))?;
        Ok(found.map(|object| ClusterObject {
            api_version: api_version_of(&gvk),
            kind: gvk.kind.clone(),
            name: object.name_any(),
            namespace: object.namespace(),
            body: serde_json::to_value(&object).unwrap_or(Value::Null),
        }))
    }

    async fn scale_deployment_config(
        &self,
        namespace: &str,
        name: &str,
        replicas: u32,
    ) -> Result<(), ClusterError> {
        let api = self.dynamic_api(&deployment_config_gvk(), namespace)?;
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|err| ClusterError::Api(err.to_string()))?;
        Ok(())
    }

    async fn route_host(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<String>, ClusterError> {
        let api = self.dynamic_api(&route_gvk(), namespace)?;
        let route = api
            .get_opt(name)
            .await
            .map_err(|err| ClusterError::Api(err.to_string()))?;
        Ok(route.and_then(|route| {
            route
                .data
                .pointer("/spec/host")
                .and_then(Value::as_str)
                .map(str::to_string)
        }))
    }

    async fn delete(&self, object: &ClusterObject) -> Result<(), ClusterError> {
        let gvk = gvk_from(&object.api_version, &object.kind);
        let namespace = object.namespace.as_deref().unwrap_or(&self.namespace);
        let api = self.dynamic_api(&gvk, namespace)?;
        match api
            .delete(&object.name, &DeleteParams::default().grace_period(0))
            .await
        {
            // The server answers with either the doomed object or a Status;
            // both mean the deletion is underway.
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
            Err(err) => Err(ClusterError::Api(err.to_string())),
        }
    }
}

fn deployment_config_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk("apps.openshift.io", "v1", DEPLOYMENT_CONFIG_KIND)
}

fn route_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk("route.openshift.io", "v1", "Route")
}

fn api_version_of(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        gvk.version.clone()
    } else {
        format!("{}/{}", gvk.group, gvk.version)
    }
}

fn gvk_from(api_version: &str, kind: &str) -> GroupVersionKind {
    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    };
    GroupVersionKind::gvk(group, version, kind)
}

fn doc_gvk(doc: &Value) -> Result<GroupVersionKind, ClusterError> {
    let api_version = doc
        .get("apiVersion")
        .and_then(Value::as_str)
        .ok_or_else(|| ClusterError::Malformed("document has no apiVersion".to_string()))?;
    let kind = doc
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| ClusterError::Malformed("document has no kind".to_string()))?;
    Ok(gvk_from(api_version, kind))
}

fn pod_view(pod: &Pod) -> PodView {
    let status = pod.status.as_ref();
    PodView {
        name: pod.name_any(),
        labels: pod.metadata.labels.clone().unwrap_or_default(),
        phase: status.and_then(|status| status.phase.clone()),
        ready: status
            .and_then(|status| status.conditions.as_ref())
            .and_then(|conditions| conditions.iter().find(|condition| condition.type_ == "Ready"))
            .map(|condition| condition.status == "True"),
    }
}
