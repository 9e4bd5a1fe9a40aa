use async_trait::async_trait;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIGroup, APIResource};
use kube::api::{Api, DeleteParams, EvictParams, ListParams, Patch, PatchParams};
use kube::ResourceExt;
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

#[async_trait]
/// The subset of the Kubernetes API needed to cordon and drain a Node. This is provided as a trait
/// in order to allow an in-memory cluster to be used for testing purposes.
///
/// Handles are cloned into every concurrent Pod removal, so implementations must be cheap to clone.
pub trait ClusterClient: Clone + Sized + Send + Sync + 'static {
    /// List Nodes, optionally filtered by a label selector.
    async fn list_nodes(&self, label_selector: Option<&str>) -> kube::Result<Vec<Node>>;
    /// Mark the Node unschedulable. When a resource version is given, the patch only applies to
    /// that version of the Node and fails with a conflict otherwise.
    async fn cordon_node(&self, node_name: &str, resource_version: Option<&str>)
        -> kube::Result<Node>;
    /// List the Pods bound to the Node, optionally filtered by a label selector.
    async fn list_pods(&self, node_name: &str, label_selector: Option<&str>)
        -> kube::Result<Vec<Pod>>;
    /// Fetch a single Pod, returning `None` if it does not exist.
    async fn get_pod(&self, namespace: &str, name: &str) -> kube::Result<Option<Pod>>;
    /// Create an Eviction for the Pod.
    async fn evict_pod(&self, pod: &Pod, grace_period_seconds: Option<u32>) -> kube::Result<()>;
    /// Delete the Pod directly, bypassing PodDisruptionBudgets.
    async fn delete_pod(&self, pod: &Pod, grace_period_seconds: Option<u32>) -> kube::Result<()>;
    /// Whether the named DaemonSet exists.
    async fn daemon_set_exists(&self, namespace: &str, name: &str) -> kube::Result<bool>;
    /// The API groups served by the cluster.
    async fn api_groups(&self) -> kube::Result<Vec<APIGroup>>;
    /// The resources served by the core `v1` API.
    async fn core_api_resources(&self) -> kube::Result<Vec<APIResource>>;
}

#[async_trait]
impl<T> ClusterClient for Arc<T>
where
    T: ClusterClient,
{
    async fn list_nodes(&self, label_selector: Option<&str>) -> kube::Result<Vec<Node>> {
        (**self).list_nodes(label_selector).await
    }

    async fn cordon_node(
        &self,
        node_name: &str,
        resource_version: Option<&str>,
    ) -> kube::Result<Node> {
        (**self).cordon_node(node_name, resource_version).await
    }

    async fn list_pods(
        &self,
        node_name: &str,
        label_selector: Option<&str>,
    ) -> kube::Result<Vec<Pod>> {
        (**self).list_pods(node_name, label_selector).await
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> kube::Result<Option<Pod>> {
        (**self).get_pod(namespace, name).await
    }

    async fn evict_pod(&self, pod: &Pod, grace_period_seconds: Option<u32>) -> kube::Result<()> {
        (**self).evict_pod(pod, grace_period_seconds).await
    }

    async fn delete_pod(&self, pod: &Pod, grace_period_seconds: Option<u32>) -> kube::Result<()> {
        (**self).delete_pod(pod, grace_period_seconds).await
    }

    async fn daemon_set_exists(&self, namespace: &str, name: &str) -> kube::Result<bool> {
        (**self).daemon_set_exists(namespace, name).await
    }

    async fn api_groups(&self) -> kube::Result<Vec<APIGroup>> {
        (**self).api_groups().await
    }

    async fn core_api_resources(&self) -> kube::Result<Vec<APIResource>> {
        (**self).core_api_resources().await
    }
}

#[derive(Clone)]
/// Concrete implementation of the `ClusterClient` trait. This implementation will almost
/// certainly be used in any case that isn't a unit test.
pub struct K8SClusterClient {
    k8s_client: kube::client::Client,
}

impl K8SClusterClient {
    pub fn new(k8s_client: kube::client::Client) -> Self {
        K8SClusterClient { k8s_client }
    }

    /// Creates a kube::Api<Pod> for interacting with Pods in the namespace associated with the given Pod.
    fn namespaced_pod_api(&self, pod: &Pod) -> Api<Pod> {
        match pod.metadata.namespace.as_ref() {
            Some(ns) => Api::namespaced(self.k8s_client.clone(), ns),
            None => Api::default_namespaced(self.k8s_client.clone()),
        }
    }
}

fn delete_params(grace_period_seconds: Option<u32>) -> DeleteParams {
    DeleteParams {
        grace_period_seconds,
        ..Default::default()
    }
}

#[async_trait]
impl ClusterClient for K8SClusterClient {
    #[instrument(skip(self), err)]
    async fn list_nodes(&self, label_selector: Option<&str>) -> kube::Result<Vec<Node>> {
        let nodes: Api<Node> = Api::all(self.k8s_client.clone());
        let mut list_params = ListParams::default();
        if let Some(selector) = label_selector {
            list_params = list_params.labels(selector);
        }
        Ok(nodes.list(&list_params).await?.items)
    }

    #[instrument(skip(self), err)]
    async fn cordon_node(
        &self,
        node_name: &str,
        resource_version: Option<&str>,
    ) -> kube::Result<Node> {
        let nodes: Api<Node> = Api::all(self.k8s_client.clone());
        // Including the resourceVersion in a merge patch makes the API server reject the patch with a
        // 409 if the Node changed since it was read.
        let patch = match resource_version {
            Some(version) => json!({
                "metadata": { "resourceVersion": version },
                "spec": { "unschedulable": true }
            }),
            None => json!({ "spec": { "unschedulable": true } }),
        };
        nodes
            .patch(node_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
    }

    #[instrument(skip(self), err)]
    async fn list_pods(
        &self,
        node_name: &str,
        label_selector: Option<&str>,
    ) -> kube::Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::all(self.k8s_client.clone());
        let mut list_params =
            ListParams::default().fields(&format!("spec.nodeName={}", node_name));
        if let Some(selector) = label_selector {
            list_params = list_params.labels(selector);
        }
        Ok(pods.list(&list_params).await?.items)
    }

    #[instrument(skip(self), err)]
    async fn get_pod(&self, namespace: &str, name: &str) -> kube::Result<Option<Pod>> {
        let pods: Api<Pod> = Api::namespaced(self.k8s_client.clone(), namespace);
        pods.get_opt(name).await
    }

    #[instrument(skip(self, pod), fields(pod = %pod.name_any()), err)]
    async fn evict_pod(&self, pod: &Pod, grace_period_seconds: Option<u32>) -> kube::Result<()> {
        let evict_params = EvictParams {
            delete_options: Some(delete_params(grace_period_seconds)),
            ..Default::default()
        };
        self.namespaced_pod_api(pod)
            .evict(&pod.name_any(), &evict_params)
            .await
            .map(|_| ())
    }

    #[instrument(skip(self, pod), fields(pod = %pod.name_any()), err)]
    async fn delete_pod(&self, pod: &Pod, grace_period_seconds: Option<u32>) -> kube::Result<()> {
        self.namespaced_pod_api(pod)
            .delete(&pod.name_any(), &delete_params(grace_period_seconds))
            .await
            .map(|_| ())
    }

    #[instrument(skip(self), err)]
    async fn daemon_set_exists(&self, namespace: &str, name: &str) -> kube::Result<bool> {
        let daemon_sets: Api<DaemonSet> = Api::namespaced(self.k8s_client.clone(), namespace);
        Ok(daemon_sets.get_opt(name).await?.is_some())
    }

    #[instrument(skip(self), err)]
    async fn api_groups(&self) -> kube::Result<Vec<APIGroup>> {
        Ok(self.k8s_client.list_api_groups().await?.groups)
    }

    #[instrument(skip(self), err)]
    async fn core_api_resources(&self) -> kube::Result<Vec<APIResource>> {
        Ok(self.k8s_client.list_core_api_resources("v1").await?.resources)
    }
}
