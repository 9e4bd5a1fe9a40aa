//! Selects the Pods which must be removed from a Node before it can be terminated.
//!
//! Selection follows `kubectl drain`: every Pod bound to the Node is a candidate, except for
//! * completed Pods, which will never run again,
//! * static mirror Pods, which cannot be controlled through the API server,
//! * DaemonSet Pods, because the DaemonSet controller ignores cordons and would recreate them.
//!
//! Some Pods can only be removed when the operator explicitly allows it. Pods with local storage
//! lose their data, and Pods without a controller will not be rescheduled anywhere. Those are
//! reported as precondition violations unless the matching option is set, in which case they are
//! removed with a warning.
use super::client::ClusterClient;
use super::error::{self, Result};
use super::DrainOptions;
use crate::constants::{
    DAEMON_SET_KIND, MIRROR_POD_ANNOTATION, POD_PHASE_FAILED, POD_PHASE_SUCCEEDED,
};

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use snafu::{ensure, ResultExt};
use tracing::{event, instrument, Level};

const DAEMON_SET_FATAL: &str = "cannot delete DaemonSet-managed Pods (use --ignore-daemonsets to ignore)";
const DAEMON_SET_WARNING: &str = "ignoring DaemonSet-managed Pods";
const ORPHANED_FATAL: &str =
    "cannot delete Pods of a DaemonSet which no longer exists (use --force to override)";
const ORPHANED_WARNING: &str = "deleting Pods of a DaemonSet which no longer exists";
const LOCAL_STORAGE_FATAL: &str =
    "cannot delete Pods with local storage (use --delete-local-data to override)";
const LOCAL_STORAGE_WARNING: &str = "deleting Pods with local storage";
const UNMANAGED_FATAL: &str = "cannot delete Pods not managed by ReplicationController, ReplicaSet, Job, DaemonSet or StatefulSet (use --force to override)";
const UNMANAGED_WARNING: &str = "deleting Pods not managed by ReplicationController, ReplicaSet, Job, DaemonSet or StatefulSet";

/// Pods grouped by the reason they were flagged, keeping the order reasons were first seen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Findings(Vec<(&'static str, Vec<String>)>);

impl Findings {
    fn add(&mut self, reason: &'static str, pod: &Pod) {
        let pod_name = qualified_name(pod);
        match self.0.iter_mut().find(|(existing, _)| *existing == reason) {
            Some((_, pods)) => pods.push(pod_name),
            None => self.0.push((reason, vec![pod_name])),
        }
    }

    fn messages(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|(reason, pods)| format!("{}: {}", reason, pods.join(", ")))
            .collect()
    }
}

/// The Pods selected for removal from a Node.
#[derive(Clone, Debug, Default)]
pub struct RemovalSet {
    pods: Vec<Pod>,
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl RemovalSet {
    pub fn pods(&self) -> &[Pod] {
        &self.pods
    }

    pub fn into_pods(self) -> Vec<Pod> {
        self.pods
    }

    /// Informational reasons why Pods were skipped or removed despite their special status.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Violations that should abort the drain, one entry per reason.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn pod_names(&self) -> Vec<String> {
        self.pods.iter().map(ResourceExt::name_any).collect()
    }

    /// Fails with every precondition violation if there are any.
    pub fn check_preconditions(&self, node_name: &str) -> Result<()> {
        ensure!(
            self.errors.is_empty(),
            error::PreconditionsSnafu {
                node_name,
                violations: self.errors.clone(),
            }
        );
        Ok(())
    }
}

enum Verdict {
    Remove,
    Skip,
}

/// Lists the Pods on the Node and sorts them into the removal set, warnings and precondition
/// violations. Only a failure to talk to the API server is returned as an error.
#[instrument(skip(cluster, options), err)]
pub async fn pods_for_removal<T: ClusterClient>(
    cluster: &T,
    node_name: &str,
    options: &DrainOptions,
) -> Result<RemovalSet> {
    let pods = cluster
        .list_pods(node_name, options.pod_selector.as_deref())
        .await
        .context(error::ListPodsSnafu { node_name })?;

    let mut removal_set = RemovalSet::default();
    let mut warnings = Findings::default();
    let mut errors = Findings::default();

    for pod in pods {
        match classify(cluster, &pod, options, &mut warnings, &mut errors).await? {
            Verdict::Remove => removal_set.pods.push(pod),
            Verdict::Skip => {}
        }
    }

    removal_set.warnings = warnings.messages();
    removal_set.errors = errors.messages();
    Ok(removal_set)
}

async fn classify<T: ClusterClient>(
    cluster: &T,
    pod: &Pod,
    options: &DrainOptions,
    warnings: &mut Findings,
    errors: &mut Findings,
) -> Result<Verdict> {
    if is_completed(pod) {
        event!(
            Level::DEBUG,
            "Not draining Pod '{}': Pod has completed",
            qualified_name(pod)
        );
        return Ok(Verdict::Skip);
    }

    if let Some(daemon_set) = controller_of_kind(pod, DAEMON_SET_KIND) {
        // Pods which are already being deleted are waited on like any other.
        if pod.metadata.deletion_timestamp.is_some() {
            return Ok(Verdict::Remove);
        }
        let namespace = pod.namespace().unwrap_or_default();
        let exists = cluster
            .daemon_set_exists(&namespace, &daemon_set)
            .await
            .context(error::DaemonSetLookupSnafu {
                namespace: namespace.clone(),
                name: daemon_set.clone(),
            })?;
        if !exists {
            return Ok(if options.force {
                warnings.add(ORPHANED_WARNING, pod);
                Verdict::Remove
            } else {
                errors.add(ORPHANED_FATAL, pod);
                Verdict::Skip
            });
        }
        if options.ignore_all_daemon_sets {
            warnings.add(DAEMON_SET_WARNING, pod);
        } else {
            errors.add(DAEMON_SET_FATAL, pod);
        }
        return Ok(Verdict::Skip);
    }

    if is_mirror_pod(pod) {
        event!(
            Level::DEBUG,
            "Not draining Pod '{}': Pod is a static Mirror Pod",
            qualified_name(pod)
        );
        return Ok(Verdict::Skip);
    }

    // A Pod that violates more than one rule is reported under each of them.
    let mut verdict = Verdict::Remove;
    if has_local_storage(pod) {
        if options.delete_local_data {
            warnings.add(LOCAL_STORAGE_WARNING, pod);
        } else {
            errors.add(LOCAL_STORAGE_FATAL, pod);
            verdict = Verdict::Skip;
        }
    }

    if pod
        .metadata
        .owner_references
        .as_ref()
        .map_or(true, |refs| !refs.iter().any(|r| r.controller == Some(true)))
    {
        if options.force {
            warnings.add(UNMANAGED_WARNING, pod);
        } else {
            errors.add(UNMANAGED_FATAL, pod);
            verdict = Verdict::Skip;
        }
    }

    Ok(verdict)
}

/// Formats a Pod as `namespace/name`.
pub fn qualified_name(pod: &Pod) -> String {
    match pod.namespace() {
        Some(namespace) => format!("{}/{}", namespace, pod.name_any()),
        None => pod.name_any(),
    }
}

fn is_completed(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        .map_or(false, |phase| {
            phase == POD_PHASE_SUCCEEDED || phase == POD_PHASE_FAILED
        })
}

fn is_mirror_pod(pod: &Pod) -> bool {
    pod.annotations().contains_key(MIRROR_POD_ANNOTATION)
}

fn has_local_storage(pod: &Pod) -> bool {
    pod.spec
        .as_ref()
        .and_then(|spec| spec.volumes.as_ref())
        .map_or(false, |volumes| {
            volumes.iter().any(|volume| volume.empty_dir.is_some())
        })
}

/// The name of the Pod's controller, if it is of the given kind.
fn controller_of_kind(pod: &Pod, kind: &str) -> Option<String> {
    pod.metadata
        .owner_references
        .as_ref()?
        .iter()
        .find(|reference| reference.controller == Some(true) && reference.kind == kind)
        .map(|reference| reference.name.clone())
}
