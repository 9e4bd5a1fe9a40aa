//! An in-memory cluster for use in tests.
//!
//! Removal requests act immediately unless a Pod is set to linger: evicted or deleted Pods disappear
//! from the fake (or are replaced by a Pod with the same name and a new UID when re-creation is
//! enabled). Failures are injected per Pod name.
use super::client::ClusterClient;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    EmptyDirVolumeSource, Node, NodeSpec, Pod, PodSpec, PodStatus, Volume,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    APIGroup, APIResource, GroupVersionForDiscovery, ObjectMeta, OwnerReference,
};
use kube::error::ErrorResponse;
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::{Duration, Instant};

/// Builds the error the API server would return for the given status code.
pub fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{} ({})", reason, code),
        reason: reason.to_string(),
        code,
    })
}

#[derive(Default)]
struct FakeState {
    nodes: Vec<Node>,
    pods: Vec<Pod>,
    daemon_sets: BTreeSet<(String, String)>,
    eviction_unsupported: bool,
    discovery_fails: bool,
    conflicts: usize,
    rate_limits: BTreeMap<String, Option<usize>>,
    failures: BTreeMap<String, u16>,
    recreate_on_removal: bool,
    lingering: BTreeMap<String, Option<Duration>>,
    // Pods which were removed but are still terminating, and when they go away.
    terminating: BTreeMap<String, Option<Instant>>,
    cordon_patches: usize,
    evictions: Vec<String>,
    deletions: Vec<String>,
    generation: u64,
}

#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<FakeState>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        let mut state = self.state.lock().expect("fake cluster lock poisoned");
        state.finish_terminating();
        state
    }

    pub fn with_node(self, name: &str) -> Self {
        self.with_node_object(node(name, BTreeMap::new(), None))
    }

    pub fn with_node_object(self, node: Node) -> Self {
        self.lock().nodes.push(node);
        self
    }

    pub fn with_pod(self, pod: Pod) -> Self {
        self.lock().pods.push(pod);
        self
    }

    pub fn with_daemon_set(self, namespace: &str, name: &str) -> Self {
        self.lock()
            .daemon_sets
            .insert((namespace.to_string(), name.to_string()));
        self
    }

    pub fn without_eviction_support(self) -> Self {
        self.lock().eviction_unsupported = true;
        self
    }

    pub fn failing_discovery(self) -> Self {
        self.lock().discovery_fails = true;
        self
    }

    /// The next `count` cordon patches fail with a conflict, as if the Node changed concurrently.
    pub fn with_conflicts(self, count: usize) -> Self {
        self.lock().conflicts = count;
        self
    }

    /// Evictions of the Pod are rejected with a 429 `times` times, or forever for `None`.
    pub fn rate_limit(self, pod_name: &str, times: Option<usize>) -> Self {
        self.lock().rate_limits.insert(pod_name.to_string(), times);
        self
    }

    /// Every removal request for the Pod fails with the given status code.
    pub fn fail_removal(self, pod_name: &str, code: u16) -> Self {
        self.lock().failures.insert(pod_name.to_string(), code);
        self
    }

    /// A removed Pod stays visible for `duration` before it is gone, or forever for `None`, like a
    /// Pod running out its termination grace period.
    pub fn linger(self, pod_name: &str, duration: Option<Duration>) -> Self {
        self.lock().lingering.insert(pod_name.to_string(), duration);
        self
    }

    /// Removed Pods come back with the same name and a new UID, like StatefulSet Pods do.
    pub fn recreate_on_removal(self) -> Self {
        self.lock().recreate_on_removal = true;
        self
    }

    pub fn node(&self, name: &str) -> Option<Node> {
        self.lock()
            .nodes
            .iter()
            .find(|node| node.name_any() == name)
            .cloned()
    }

    pub fn is_cordoned(&self, name: &str) -> bool {
        self.node(name)
            .and_then(|node| node.spec)
            .and_then(|spec| spec.unschedulable)
            .unwrap_or(false)
    }

    pub fn pod_names_on(&self, node_name: &str) -> Vec<String> {
        self.lock()
            .pods
            .iter()
            .filter(|pod| pod_node_name(pod) == Some(node_name))
            .map(ResourceExt::name_any)
            .collect()
    }

    pub fn pod(&self, name: &str) -> Option<Pod> {
        self.lock()
            .pods
            .iter()
            .find(|pod| pod.name_any() == name)
            .cloned()
    }

    pub fn cordon_patches(&self) -> usize {
        self.lock().cordon_patches
    }

    pub fn evictions(&self) -> Vec<String> {
        self.lock().evictions.clone()
    }

    pub fn deletions(&self) -> Vec<String> {
        self.lock().deletions.clone()
    }

    fn remove(&self, pod: &Pod, honor_rate_limits: bool) -> kube::Result<String> {
        let mut state = self.lock();
        let name = pod.name_any();

        if let Some(code) = state.failures.get(&name) {
            return Err(api_error(*code, "InjectedFailure"));
        }
        if honor_rate_limits {
            if let Some(remaining) = state.rate_limits.get_mut(&name) {
                match remaining {
                    None => return Err(api_error(429, "TooManyRequests")),
                    Some(0) => {}
                    Some(count) => {
                        *count -= 1;
                        return Err(api_error(429, "TooManyRequests"));
                    }
                }
            }
        }

        let index = state
            .pods
            .iter()
            .position(|existing| {
                existing.name_any() == name && existing.namespace() == pod.namespace()
            })
            .ok_or_else(|| api_error(404, "NotFound"))?;

        if let Some(linger) = state.lingering.get(&name).copied() {
            state
                .terminating
                .entry(name.clone())
                .or_insert_with(|| linger.map(|duration| Instant::now() + duration));
            return Ok(name);
        }
        state.remove_at(index);
        Ok(name)
    }
}

impl FakeState {
    fn remove_at(&mut self, index: usize) {
        let removed = self.pods.remove(index);
        if self.recreate_on_removal {
            self.generation += 1;
            let mut replacement = removed;
            replacement.metadata.uid =
                Some(format!("{}-{}", replacement.name_any(), self.generation));
            self.pods.push(replacement);
        }
    }

    fn finish_terminating(&mut self) {
        let now = Instant::now();
        let finished: Vec<String> = self
            .terminating
            .iter()
            .filter(|(_, gone_at)| matches!(gone_at, Some(gone_at) if *gone_at <= now))
            .map(|(name, _)| name.clone())
            .collect();
        for name in finished {
            self.terminating.remove(&name);
            if let Some(index) = self.pods.iter().position(|pod| pod.name_any() == name) {
                self.remove_at(index);
            }
        }
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn list_nodes(&self, label_selector: Option<&str>) -> kube::Result<Vec<Node>> {
        Ok(self
            .lock()
            .nodes
            .iter()
            .filter(|node| matches_selector(label_selector, node.labels()))
            .cloned()
            .collect())
    }

    async fn cordon_node(
        &self,
        node_name: &str,
        resource_version: Option<&str>,
    ) -> kube::Result<Node> {
        let mut state = self.lock();
        let conflicted = state.conflicts > 0;
        if conflicted {
            state.conflicts -= 1;
        }
        let node = state
            .nodes
            .iter_mut()
            .find(|node| node.name_any() == node_name)
            .ok_or_else(|| api_error(404, "NotFound"))?;

        if conflicted {
            bump_resource_version(node);
            return Err(api_error(409, "Conflict"));
        }
        if let Some(expected) = resource_version {
            if node.metadata.resource_version.as_deref() != Some(expected) {
                return Err(api_error(409, "Conflict"));
            }
        }

        node.spec.get_or_insert_with(Default::default).unschedulable = Some(true);
        bump_resource_version(node);
        let node = node.clone();
        state.cordon_patches += 1;
        Ok(node)
    }

    async fn list_pods(
        &self,
        node_name: &str,
        label_selector: Option<&str>,
    ) -> kube::Result<Vec<Pod>> {
        Ok(self
            .lock()
            .pods
            .iter()
            .filter(|pod| pod_node_name(pod) == Some(node_name))
            .filter(|pod| matches_selector(label_selector, pod.labels()))
            .cloned()
            .collect())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> kube::Result<Option<Pod>> {
        Ok(self
            .lock()
            .pods
            .iter()
            .find(|pod| pod.name_any() == name && pod.namespace().as_deref() == Some(namespace))
            .cloned())
    }

    async fn evict_pod(&self, pod: &Pod, _grace_period_seconds: Option<u32>) -> kube::Result<()> {
        let name = self.remove(pod, true)?;
        self.lock().evictions.push(name);
        Ok(())
    }

    async fn delete_pod(&self, pod: &Pod, _grace_period_seconds: Option<u32>) -> kube::Result<()> {
        let name = self.remove(pod, false)?;
        self.lock().deletions.push(name);
        Ok(())
    }

    async fn daemon_set_exists(&self, namespace: &str, name: &str) -> kube::Result<bool> {
        Ok(self
            .lock()
            .daemon_sets
            .contains(&(namespace.to_string(), name.to_string())))
    }

    async fn api_groups(&self) -> kube::Result<Vec<APIGroup>> {
        let state = self.lock();
        if state.discovery_fails {
            return Err(api_error(403, "Forbidden"));
        }
        let mut groups = vec![api_group("apps", "apps/v1")];
        if !state.eviction_unsupported {
            groups.push(api_group("policy", "policy/v1"));
        }
        Ok(groups)
    }

    async fn core_api_resources(&self) -> kube::Result<Vec<APIResource>> {
        let state = self.lock();
        if state.discovery_fails {
            return Err(api_error(403, "Forbidden"));
        }
        let mut resources = vec![APIResource {
            name: "pods".to_string(),
            kind: "Pod".to_string(),
            namespaced: true,
            ..Default::default()
        }];
        if !state.eviction_unsupported {
            resources.push(APIResource {
                name: "pods/eviction".to_string(),
                kind: "Eviction".to_string(),
                namespaced: true,
                ..Default::default()
            });
        }
        Ok(resources)
    }
}

fn api_group(name: &str, group_version: &str) -> APIGroup {
    let version = GroupVersionForDiscovery {
        group_version: group_version.to_string(),
        version: group_version.rsplit('/').next().unwrap_or_default().to_string(),
    };
    APIGroup {
        name: name.to_string(),
        preferred_version: Some(version.clone()),
        versions: vec![version],
        ..Default::default()
    }
}

fn bump_resource_version(node: &mut Node) {
    let next = node
        .metadata
        .resource_version
        .as_deref()
        .and_then(|version| version.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    node.metadata.resource_version = Some(next.to_string());
}

fn pod_node_name(pod: &Pod) -> Option<&str> {
    pod.spec.as_ref().and_then(|spec| spec.node_name.as_deref())
}

/// Supports the equality subset of label selectors (`key=value,other=value`) and bare `key`
/// existence checks.
fn matches_selector(selector: Option<&str>, labels: &BTreeMap<String, String>) -> bool {
    let selector = match selector {
        Some(selector) => selector,
        None => return true,
    };
    selector
        .split(',')
        .map(str::trim)
        .filter(|requirement| !requirement.is_empty())
        .all(|requirement| match requirement.split_once('=') {
            Some((key, value)) => labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
            None => labels.contains_key(requirement),
        })
}

/// A Node with the given labels and `spec.providerID`.
pub fn node(name: &str, labels: BTreeMap<String, String>, provider_id: Option<&str>) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            resource_version: Some("1".to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(NodeSpec {
            provider_id: provider_id.map(str::to_string),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A running Pod without a controller.
pub fn unmanaged_pod(namespace: &str, name: &str, node_name: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("{}-0", name)),
            ..Default::default()
        },
        spec: Some(PodSpec {
            node_name: Some(node_name.to_string()),
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some("Running".to_string()),
            ..Default::default()
        }),
    }
}

/// A running Pod controlled by a ReplicaSet.
pub fn managed_pod(namespace: &str, name: &str, node_name: &str) -> Pod {
    with_controller(
        unmanaged_pod(namespace, name, node_name),
        "ReplicaSet",
        &format!("{}-rs", name),
    )
}

pub fn daemon_set_pod(namespace: &str, name: &str, node_name: &str, daemon_set: &str) -> Pod {
    with_controller(
        unmanaged_pod(namespace, name, node_name),
        "DaemonSet",
        daemon_set,
    )
}

pub fn mirror_pod(namespace: &str, name: &str, node_name: &str) -> Pod {
    let mut pod = unmanaged_pod(namespace, name, node_name);
    pod.annotations_mut().insert(
        crate::constants::MIRROR_POD_ANNOTATION.to_string(),
        "checksum".to_string(),
    );
    pod
}

pub fn with_controller(mut pod: Pod, kind: &str, name: &str) -> Pod {
    pod.metadata.owner_references = Some(vec![OwnerReference {
        api_version: "apps/v1".to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
        uid: format!("{}-uid", name),
        controller: Some(true),
        ..Default::default()
    }]);
    pod
}

pub fn with_phase(mut pod: Pod, phase: &str) -> Pod {
    pod.status.get_or_insert_with(Default::default).phase = Some(phase.to_string());
    pod
}

pub fn with_empty_dir(mut pod: Pod) -> Pod {
    pod.spec
        .get_or_insert_with(Default::default)
        .volumes
        .get_or_insert_with(Vec::new)
        .push(Volume {
            name: "scratch".to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
    pod
}

pub fn with_labels(mut pod: Pod, labels: BTreeMap<String, String>) -> Pod {
    pod.labels_mut().extend(labels);
    pod
}
