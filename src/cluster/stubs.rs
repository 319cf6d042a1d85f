//! In-memory control planes for exercising the lifecycle without a cluster.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::cluster::model::{
    ClusterError, ClusterObject, ControlPlane, PodView, DEPLOYMENT_CONFIG_KIND,
};

/// Control plane whose answers are scripted up front. Every mutation is
/// recorded so tests can assert on exact call sequences.
pub struct Scripted {
    namespace: String,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    pod_batches: VecDeque<Vec<PodView>>,
    routes: HashMap<String, String>,
    deployment_configs: HashMap<String, ClusterObject>,
    scale_requests: Vec<(String, u32)>,
    delete_failures: HashMap<(String, String), u32>,
    delete_attempts: Vec<(String, String)>,
}

impl Scripted {
    pub fn new(namespace: &str) -> Scripted {
        Scripted {
            namespace: namespace.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    /// Queue the pod list served by the next poll. The last batch queued
    /// keeps being served once the queue has drained to it.
    pub fn push_pod_batch(&self, pods: Vec<PodView>) {
        self.state().pod_batches.push_back(pods);
    }

    pub fn set_route(&self, name: &str, host: &str) {
        self.state().routes.insert(name.to_string(), host.to_string());
    }

    /// Make the next `times` delete calls for this object fail.
    pub fn fail_deletes(&self, kind: &str, name: &str, times: u32) {
        self.state()
            .delete_failures
            .insert((kind.to_string(), name.to_string()), times);
    }

    /// Every delete call observed so far, in order, as (kind, name).
    pub fn delete_attempts(&self) -> Vec<(String, String)> {
        self.state().delete_attempts.clone()
    }

    /// Every accepted scale request, in order, as (name, replicas).
    pub fn scale_requests(&self) -> Vec<(String, u32)> {
        self.state().scale_requests.clone()
    }

    /// Pod batches not yet consumed, the batch being re-served included.
    pub fn remaining_pod_batches(&self) -> usize {
        self.state().pod_batches.len()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("scripted state poisoned")
    }
}

#[async_trait]
impl ControlPlane for Scripted {
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
            let api_version = doc
                .get("apiVersion")
                .and_then(Value::as_str)
                .ok_or_else(|| ClusterError::Malformed("document has no apiVersion".to_string()))?;
            let kind = doc
                .get("kind")
                .and_then(Value::as_str)
                .ok_or_else(|| ClusterError::Malformed("document has no kind".to_string()))?;
            let name = doc
                .pointer("/metadata/name")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ClusterError::Malformed(format!("{kind} document has no metadata.name"))
                })?;
            let object = ClusterObject {
                api_version: api_version.to_string(),
                kind: kind.to_string(),
                name: name.to_string(),
                namespace: Some(
                    doc.pointer("/metadata/namespace")
                        .and_then(Value::as_str)
                        .unwrap_or(namespace)
                        .to_string(),
                ),
                body: doc.clone(),
            };
            if object.kind == DEPLOYMENT_CONFIG_KIND {
                self.state()
                    .deployment_configs
                    .insert(object.name.clone(), object.clone());
            }
            created.push(object);
        }
        Ok(created)
    }

    async fn pods(
        &self,
        _namespace: &str,
        selector: Option<(&str, &str)>,
    ) -> Result<Vec<PodView>, ClusterError> {
        let batch = {
            let mut state = self.state();
            if state.pod_batches.len() > 1 {
                state.pod_batches.pop_front().unwrap_or_default()
            } else {
                state.pod_batches.front().cloned().unwrap_or_default()
            }
        };
        Ok(match selector {
            Some((label, value)) => batch
                .into_iter()
                .filter(|pod| pod.labels.get(label).map(String::as_str) == Some(value))
                .collect(),
            None => batch,
        })
    }

    async fn deployment_config(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<ClusterObject>, ClusterError> {
        Ok(self.state().deployment_configs.get(name).cloned())
    }

    async fn scale_deployment_config(
        &self,
        _namespace: &str,
        name: &str,
        replicas: u32,
    ) -> Result<(), ClusterError> {
        self.state().scale_requests.push((name.to_string(), replicas));
        Ok(())
    }

    async fn route_host(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<String>, ClusterError> {
        Ok(self.state().routes.get(name).cloned())
    }

    async fn delete(&self, object: &ClusterObject) -> Result<(), ClusterError> {
        let key = (object.kind.clone(), object.name.clone());
        let mut state = self.state();
        state.delete_attempts.push(key.clone());
        if let Some(remaining) = state.delete_failures.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ClusterError::Api(format!(
                    "scripted failure deleting {} {}",
                    object.kind, object.name
                )));
            }
        }
        Ok(())
    }
}

/// Control plane that cannot be reached at all.
pub struct Offline;

impl Offline {
    fn refused<T>() -> Result<T, ClusterError> {
        Err(ClusterError::Connection("connection refused".to_string()))
    }
}

#[async_trait]
impl ControlPlane for Offline {
    fn namespace(&self) -> &str {
        "default"
    }

    async fn apply(
        &self,
        _namespace: &str,
        _docs: &[Value],
    ) -> Result<Vec<ClusterObject>, ClusterError> {
        Offline::refused()
    }

    async fn pods(
        &self,
        _namespace: &str,
        _selector: Option<(&str, &str)>,
    ) -> Result<Vec<PodView>, ClusterError> {
        Offline::refused()
    }

    async fn deployment_config(
        &self,
        _namespace: &str,
        _name: &str,
    ) -> Result<Option<ClusterObject>, ClusterError> {
        Offline::refused()
    }

    async fn scale_deployment_config(
        &self,
        _namespace: &str,
        _name: &str,
        _replicas: u32,
    ) -> Result<(), ClusterError> {
        Offline::refused()
    }

    async fn route_host(
        &self,
        _namespace: &str,
        _name: &str,
    ) -> Result<Option<String>, ClusterError> {
        Offline::refused()
    }

    async fn delete(&self, _object: &ClusterObject) -> Result<(), ClusterError> {
        Offline::refused()
    }
}
