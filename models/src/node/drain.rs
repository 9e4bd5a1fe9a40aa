//! Provides an implementation for draining Pods from a Kubernetes Node, similar to `kubectl drain`.
//!
//! Draining in Kubernetes is done client side, and is a combination of "cordoning" a Node by marking
//! it as unschedulable, followed by evicting (or deleting, which is a distinct concept) Pods from
//! the Node. Evictions respect PodDisruptionBudgets (PDBs) and are used whenever the cluster
//! supports them.
//!
//! Every Pod is removed by its own task. Tasks report through a shared channel, and the drain waits
//! for all of them or for the global deadline, whichever comes first.
use super::client::ClusterClient;
use super::error::{self, is_not_found, is_too_many_requests, DrainError, Result};
use super::eviction::{removal_policy, RemovalPolicy};
use super::pods::{pods_for_removal, qualified_name};
use super::DrainOptions;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::ResourceExt;
use snafu::{ensure, ResultExt};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout_at, Duration, Instant};
use tokio_retry::{strategy::FixedInterval, RetryIf};
use tracing::{event, instrument, Instrument, Level};

#[cfg(any(feature = "mockall", test))]
use mockall::mock;

// When waiting for a PodDisruptionBudget to be satisfied we stall for a fixed rate between eviction attempts.
// `kubectl drain` similarly waits 5 seconds between eviction attempts.
const EVICTION_RETRY_INTERVAL: Duration = Duration::from_secs(5);

// After evictions are created, we wait for the Pods to be deleted by Kubernetes.
const DELETION_CHECK_INTERVAL: Duration = Duration::from_secs(1);

// A zero timeout means waiting "forever". About thirty years keeps deadline arithmetic from overflowing.
const UNBOUNDED_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

// Cordoning races with other writers of the Node object, such as the kubelet updating its status.
const CONFLICT_RETRY_INTERVAL: Duration = Duration::from_millis(200);
const CONFLICT_RETRIES: usize = 10;

/// Wrapper struct to provide retry configurations for cordoning.
struct ConflictRetryStrategy {}
impl ConflictRetryStrategy {
    fn retry_strategy() -> impl Iterator<Item = Duration> {
        FixedInterval::new(CONFLICT_RETRY_INTERVAL).take(CONFLICT_RETRIES)
    }
}

impl tokio_retry::Condition<DrainError> for ConflictRetryStrategy {
    fn should_retry(&mut self, error: &DrainError) -> bool {
        error.is_conflict()
    }
}

/// The state change made by cordoning a Node.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CordonOutcome {
    Cordoned,
    AlreadyCordoned,
}

/// How a single Pod left the Node.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RemovalOutcome {
    Removed,
    /// The Pod was already gone when it was removed.
    NotFound,
}

#[async_trait]
/// Cordons a Node and removes its Pods. This is provided as a trait in order to allow mocks to be
/// used for testing purposes.
pub trait Drainer: Send + Sync {
    async fn drain(&self, node_name: &str) -> Result<()>;
}

#[cfg(any(feature = "mockall", test))]
mock! {
    /// A Mock Drainer for use in tests.
    pub Drainer {}
    #[async_trait]
    impl Drainer for Drainer {
        async fn drain(&self, node_name: &str) -> Result<()>;
    }
}

/// Drains Nodes through a `ClusterClient`.
#[derive(Clone)]
pub struct NodeDrainer<T: ClusterClient> {
    cluster: T,
    options: DrainOptions,
}

impl<T: ClusterClient> NodeDrainer<T> {
    pub fn new(cluster: T, options: DrainOptions) -> Self {
        NodeDrainer { cluster, options }
    }

    /// Finds the Node among those matching the configured Node selector.
    #[instrument(skip(self), err)]
    pub async fn get_node(&self, node_name: &str) -> Result<Node> {
        ensure!(!node_name.is_empty(), error::EmptyNodeNameSnafu);

        let nodes = self
            .cluster
            .list_nodes(self.options.selector.as_deref())
            .await
            .context(error::ListNodesSnafu)?;

        match nodes.iter().find(|node| node.name_any() == node_name) {
            Some(node) => {
                event!(Level::DEBUG, "Found node: '{}'", node_name);
                Ok(node.clone())
            }
            None => error::NodeNotFoundSnafu {
                node_name,
                available: nodes.iter().map(ResourceExt::name_any).collect::<Vec<_>>(),
            }
            .fail(),
        }
    }

    /// Marks the Node as unschedulable, preventing Pods from being deployed onto it.
    ///
    /// Cordoning an already cordoned Node does nothing. A patch which loses a race with another
    /// writer is retried against a freshly read Node.
    #[instrument(skip(self), err)]
    pub async fn cordon(&self, node_name: &str) -> Result<CordonOutcome> {
        RetryIf::spawn(
            ConflictRetryStrategy::retry_strategy(),
            || self.cordon_once(node_name),
            ConflictRetryStrategy {},
        )
        .await
    }

    async fn cordon_once(&self, node_name: &str) -> Result<CordonOutcome> {
        let node = self.get_node(node_name).await?;
        if is_unschedulable(&node) {
            event!(Level::INFO, "node/{} already cordoned", node_name);
            return Ok(CordonOutcome::AlreadyCordoned);
        }

        self.cluster
            .cordon_node(node_name, node.metadata.resource_version.as_deref())
            .await
            .context(error::CordonNodeSnafu { node_name })?;
        event!(Level::INFO, "node/{} cordoned", node_name);
        Ok(CordonOutcome::Cordoned)
    }

    /// Cordons the Node, then removes every Pod selected for removal.
    #[instrument(skip(self), err)]
    pub async fn drain_node(&self, node_name: &str) -> Result<()> {
        event!(Level::INFO, "Draining node: '{}'", node_name);
        self.cordon(node_name).await?;

        if !self.options.drain_delay.is_zero() {
            event!(
                Level::INFO,
                "Sleeping {:.2}s before starting to evict Pods",
                self.options.drain_delay.as_secs_f64()
            );
            sleep(self.options.drain_delay).await;
        }

        let removal_set = pods_for_removal(&self.cluster, node_name, &self.options).await?;
        removal_set.check_preconditions(node_name)?;
        for warning in removal_set.warnings() {
            event!(Level::WARN, "WARNING: {}", warning);
        }

        let outcomes = match self.remove_pods(removal_set.into_pods()).await {
            Ok(outcomes) => outcomes,
            Err(err) => return Err(self.pending_pods_error(node_name, err).await),
        };

        let already_gone = outcomes
            .iter()
            .filter(|outcome| **outcome == RemovalOutcome::NotFound)
            .count();
        event!(
            Level::INFO,
            removed = outcomes.len() - already_gone,
            already_gone,
            "node/{} drained",
            node_name
        );
        Ok(())
    }

    /// Re-reads the Pods still on the Node so that the error reflects what actually remains.
    async fn pending_pods_error(&self, node_name: &str, err: DrainError) -> DrainError {
        event!(
            Level::ERROR,
            "There are pending Pods on node '{}' when an error occurred: {}",
            node_name,
            err
        );

        let (pending, enumeration_errors) =
            match pods_for_removal(&self.cluster, node_name, &self.options).await {
                Ok(removal_set) => (
                    removal_set.pods().iter().map(qualified_name).collect(),
                    removal_set.errors().to_vec(),
                ),
                Err(list_err) => (Vec::new(), vec![list_err.to_string()]),
            };

        for pod in &pending {
            event!(Level::ERROR, "pod/{}", pod);
        }
        if !enumeration_errors.is_empty() {
            event!(
                Level::ERROR,
                "Following errors also occurred: [{}]",
                enumeration_errors.join(", ")
            );
        }

        DrainError::PendingPods {
            node_name: node_name.to_string(),
            source: Box::new(err),
            pending,
            enumeration_errors,
        }
    }

    async fn remove_pods(&self, pods: Vec<Pod>) -> Result<Vec<RemovalOutcome>> {
        if pods.is_empty() {
            return Ok(Vec::new());
        }

        let policy = removal_policy(&self.cluster).await?;
        let timeout = self.global_timeout();
        let deadline = Instant::now() + timeout;

        match policy {
            RemovalPolicy::Evict { .. } => self.evict_pods(pods, &policy, timeout, deadline).await,
            RemovalPolicy::Delete => self.delete_pods(pods, &policy, timeout, deadline).await,
        }
    }

    fn global_timeout(&self) -> Duration {
        if self.options.timeout.is_zero() {
            UNBOUNDED_TIMEOUT
        } else {
            self.options.timeout
        }
    }

    /// Evicts every Pod concurrently and aggregates every failure.
    ///
    /// Pod tasks are not cancelled when the deadline elapses. They observe the same deadline and
    /// stop on their own.
    async fn evict_pods(
        &self,
        pods: Vec<Pod>,
        policy: &RemovalPolicy,
        timeout: Duration,
        deadline: Instant,
    ) -> Result<Vec<RemovalOutcome>> {
        let pod_count = pods.len();
        let (sender, mut receiver) = mpsc::channel(pod_count);

        for pod in pods {
            let sender = sender.clone();
            let cluster = self.cluster.clone();
            let policy = policy.clone();
            let grace_period_seconds = self.options.grace_period_seconds;
            tokio::spawn(
                async move {
                    let outcome = evict_and_wait(
                        &cluster,
                        &pod,
                        &policy,
                        grace_period_seconds,
                        timeout,
                        deadline,
                    )
                    .await;
                    // Nobody is listening anymore if the drain already timed out.
                    sender.send(outcome).await.ok();
                }
                .in_current_span(),
            );
        }
        drop(sender);

        let mut outcomes = Vec::with_capacity(pod_count);
        let mut errors = Vec::new();
        for reported in 0..pod_count {
            match timeout_at(deadline, receiver.recv()).await {
                Ok(Some(Ok(outcome))) => outcomes.push(outcome),
                Ok(Some(Err(err))) => errors.push(err),
                Ok(None) => {
                    return error::RemovalAbortedSnafu {
                        remaining: pod_count - reported,
                    }
                    .fail()
                }
                Err(_) => return error::DrainTimeoutSnafu { timeout }.fail(),
            }
        }

        // Pods which ran out of time are reported the same way as the deadline firing here.
        if !errors.is_empty() && errors.iter().all(DrainError::is_timeout) {
            return error::DrainTimeoutSnafu { timeout }.fail();
        }
        ensure!(errors.is_empty(), error::AggregateSnafu { errors });
        Ok(outcomes)
    }

    /// Deletes every Pod, then waits for all of them to disappear.
    async fn delete_pods(
        &self,
        pods: Vec<Pod>,
        policy: &RemovalPolicy,
        timeout: Duration,
        deadline: Instant,
    ) -> Result<Vec<RemovalOutcome>> {
        let mut outcomes = Vec::with_capacity(pods.len());
        for pod in &pods {
            event!(Level::INFO, "deleting pod {}", qualified_name(pod));
            match policy
                .remove(&self.cluster, pod, self.options.grace_period_seconds)
                .await
            {
                Ok(()) => outcomes.push(RemovalOutcome::Removed),
                Err(err) if is_not_found(&err) => outcomes.push(RemovalOutcome::NotFound),
                Err(err) => {
                    return Err(err).context(error::DeletePodSnafu {
                        pod_name: pod.name_any(),
                    })
                }
            }
        }

        wait_for_deletion(&self.cluster, pods, policy.verb(), timeout, deadline).await?;
        Ok(outcomes)
    }
}

#[async_trait]
impl<T: ClusterClient> Drainer for NodeDrainer<T> {
    async fn drain(&self, node_name: &str) -> Result<()> {
        self.drain_node(node_name).await
    }
}

fn is_unschedulable(node: &Node) -> bool {
    node.spec
        .as_ref()
        .and_then(|spec| spec.unschedulable)
        .unwrap_or(false)
}

/// Evicts a single Pod, retrying while a PodDisruptionBudget holds it back, then waits for it to be
/// deleted.
async fn evict_and_wait<T: ClusterClient>(
    cluster: &T,
    pod: &Pod,
    policy: &RemovalPolicy,
    grace_period_seconds: Option<u32>,
    timeout: Duration,
    deadline: Instant,
) -> Result<RemovalOutcome> {
    let pod_name = qualified_name(pod);
    loop {
        event!(Level::INFO, "evicting pod {}", pod_name);
        match policy.remove(cluster, pod, grace_period_seconds).await {
            Ok(()) => break,
            Err(err) if is_not_found(&err) => {
                event!(Level::INFO, "pod {} already gone", pod_name);
                return Ok(RemovalOutcome::NotFound);
            }
            Err(err) if is_too_many_requests(&err) => {
                // Past the deadline nobody waits for this Pod anymore.
                if Instant::now() >= deadline {
                    return error::DrainTimeoutSnafu { timeout }.fail();
                }
                event!(
                    Level::WARN,
                    "error when evicting pod {} (will retry after {:.2}s): {}",
                    pod_name,
                    EVICTION_RETRY_INTERVAL.as_secs_f64(),
                    err
                );
                sleep(EVICTION_RETRY_INTERVAL).await;
            }
            Err(err) => return Err(err).context(error::EvictPodSnafu { pod_name }),
        }
    }

    wait_for_deletion(cluster, vec![pod.clone()], policy.verb(), timeout, deadline).await?;
    Ok(RemovalOutcome::Removed)
}

/// Polls until every Pod is gone. A Pod that was recreated under the same name has a new UID and
/// counts as gone.
async fn wait_for_deletion<T: ClusterClient>(
    cluster: &T,
    mut pods: Vec<Pod>,
    verb: &str,
    max_wait: Duration,
    deadline: Instant,
) -> Result<()> {
    loop {
        let mut pending = Vec::new();
        for pod in pods {
            let namespace = pod.namespace().unwrap_or_else(|| "default".to_string());
            match cluster.get_pod(&namespace, &pod.name_any()).await {
                Ok(Some(current)) if current.metadata.uid == pod.metadata.uid => pending.push(pod),
                Ok(_) => event!(Level::INFO, "pod/{} {}", qualified_name(&pod), verb),
                Err(err) => {
                    return Err(err).context(error::WaitForPodSnafu {
                        pod_name: pod.name_any(),
                    })
                }
            }
        }

        if pending.is_empty() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return error::WaitForDeletionSnafu {
                pod_names: pending.iter().map(qualified_name).collect::<Vec<_>>(),
                max_wait,
            }
            .fail();
        }

        event!(
            Level::DEBUG,
            "{} Pods not yet {}. Waiting {:.2}s.",
            pending.len(),
            verb,
            DELETION_CHECK_INTERVAL.as_secs_f64()
        );
        sleep(DELETION_CHECK_INTERVAL).await;
        pods = pending;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node::fake::{self, FakeCluster};
    use std::io;
    use std::sync::{Arc, Mutex};

    /// Collects formatted log output.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn drainer(cluster: &FakeCluster, options: DrainOptions) -> NodeDrainer<FakeCluster> {
        NodeDrainer::new(cluster.clone(), options)
    }

    fn worker_7() -> FakeCluster {
        FakeCluster::new()
            .with_node("worker-7")
            .with_daemon_set("kube-system", "proxy")
            .with_pod(fake::managed_pod("default", "web-1", "worker-7"))
            .with_pod(fake::managed_pod("default", "web-2", "worker-7"))
            .with_pod(fake::daemon_set_pod(
                "kube-system",
                "proxy-abc",
                "worker-7",
                "proxy",
            ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_leaves_daemon_set_pods() {
        let cluster = worker_7();
        let drainer = drainer(&cluster, DrainOptions::default());

        drainer.drain("worker-7").await.unwrap();

        assert!(cluster.is_cordoned("worker-7"));
        assert_eq!(cluster.pod_names_on("worker-7"), vec!["proxy-abc"]);
        let mut evicted = cluster.evictions();
        evicted.sort();
        assert_eq!(evicted, vec!["web-1", "web-2"]);
        let removal_set = pods_for_removal(&cluster, "worker-7", &DrainOptions::default())
            .await
            .unwrap();
        assert!(removal_set.pods().is_empty());
    }

    #[tokio::test]
    async fn test_cordon_is_idempotent() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let cluster = FakeCluster::new().with_node("worker-7");
        let drainer = drainer(&cluster, DrainOptions::default());

        assert_eq!(
            drainer.cordon("worker-7").await.unwrap(),
            CordonOutcome::Cordoned
        );
        assert_eq!(
            drainer.cordon("worker-7").await.unwrap(),
            CordonOutcome::AlreadyCordoned
        );
        assert_eq!(cluster.cordon_patches(), 1);

        let output = logs.contents();
        assert_eq!(output.matches("node/worker-7 cordoned").count(), 1, "{}", output);
        assert_eq!(
            output.matches("node/worker-7 already cordoned").count(),
            1,
            "{}",
            output
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cordon_retries_conflicts() {
        let cluster = FakeCluster::new().with_node("worker-7").with_conflicts(3);
        let drainer = drainer(&cluster, DrainOptions::default());

        assert_eq!(
            drainer.cordon("worker-7").await.unwrap(),
            CordonOutcome::Cordoned
        );
        assert!(cluster.is_cordoned("worker-7"));
    }

    #[tokio::test]
    async fn test_missing_node() {
        let cluster = FakeCluster::new().with_node("worker-1").with_node("worker-2");
        let drainer = drainer(&cluster, DrainOptions::default());

        match drainer.drain("worker-7").await {
            Err(DrainError::NodeNotFound {
                node_name,
                available,
            }) => {
                assert_eq!(node_name, "worker-7");
                assert_eq!(available, vec!["worker-1", "worker-2"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        assert!(matches!(
            drainer.drain("").await,
            Err(DrainError::EmptyNodeName)
        ));
    }

    #[tokio::test]
    async fn test_node_selector_limits_nodes() {
        let cluster = FakeCluster::new().with_node_object(fake::node(
            "worker-7",
            maplit::btreemap! { "pool".to_string() => "batch".to_string() },
            None,
        ));

        let selected = drainer(
            &cluster,
            DrainOptions {
                selector: Some("pool=batch".to_string()),
                ..Default::default()
            },
        );
        assert!(selected.get_node("worker-7").await.is_ok());

        let excluded = drainer(
            &cluster,
            DrainOptions {
                selector: Some("pool=web".to_string()),
                ..Default::default()
            },
        );
        assert!(matches!(
            excluded.get_node("worker-7").await,
            Err(DrainError::NodeNotFound { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_success() {
        let cluster = worker_7().fail_removal("web-2", 404);
        let drainer = drainer(&cluster, DrainOptions::default());

        drainer.drain("worker-7").await.unwrap();
        assert_eq!(cluster.evictions(), vec!["web-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_eviction_is_retried() {
        let cluster = worker_7().rate_limit("web-1", Some(2));
        let drainer = drainer(&cluster, DrainOptions::default());
        let start = Instant::now();

        drainer.drain("worker-7").await.unwrap();
        assert!(start.elapsed() >= EVICTION_RETRY_INTERVAL * 2);
        assert_eq!(cluster.pod_names_on("worker-7"), vec!["proxy-abc"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_until_deadline() {
        // The deadline falls between two eviction attempts.
        let cluster = worker_7().rate_limit("web-1", None);
        let drainer = drainer(
            &cluster,
            DrainOptions {
                timeout: Duration::from_secs(32),
                ..Default::default()
            },
        );
        let start = Instant::now();

        let err = drainer.drain("worker-7").await.unwrap_err();
        assert!(start.elapsed() >= Duration::from_secs(32));
        assert!(err.is_timeout(), "{}", err);
        assert!(err.to_string().contains("32s"), "{}", err);
        match &err {
            DrainError::PendingPods { source, .. } => assert!(
                matches!(source.as_ref(), DrainError::DrainTimeout { .. }),
                "{:?}",
                source
            ),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.pending_pods(), &["default/web-1".to_string()]);
        assert_eq!(cluster.evictions(), vec!["web-2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_evicted_pods_to_terminate() {
        let cluster = worker_7().linger("web-1", Some(Duration::from_secs(7)));
        let drainer = drainer(&cluster, DrainOptions::default());
        let start = Instant::now();

        drainer.drain("worker-7").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(7));
        let mut evicted = cluster.evictions();
        evicted.sort();
        assert_eq!(evicted, vec!["web-1", "web-2"]);
        assert_eq!(cluster.pod_names_on("worker-7"), vec!["proxy-abc"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_while_pods_terminate() {
        let cluster = worker_7().linger("web-1", None);
        let drainer = drainer(
            &cluster,
            DrainOptions {
                timeout: Duration::from_secs(20),
                ..Default::default()
            },
        );
        let start = Instant::now();

        let err = drainer.drain("worker-7").await.unwrap_err();
        assert!(start.elapsed() >= Duration::from_secs(20));
        assert!(err.is_timeout(), "{}", err);
        assert!(err.to_string().contains("20s"), "{}", err);
        assert_eq!(err.pending_pods(), &["default/web-1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removal_outcomes() {
        let cluster = worker_7()
            .with_pod(fake::managed_pod("default", "web-3", "worker-7"))
            .fail_removal("web-2", 404);
        let drainer = drainer(&cluster, DrainOptions::default());
        let pods = pods_for_removal(&cluster, "worker-7", &DrainOptions::default())
            .await
            .unwrap()
            .into_pods();

        let outcomes = drainer.remove_pods(pods).await.unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes
                .iter()
                .filter(|outcome| **outcome == RemovalOutcome::NotFound)
                .count(),
            1
        );
        assert!(drainer.remove_pods(Vec::new()).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_removal_failures_are_aggregated() {
        let cluster = worker_7()
            .with_pod(fake::managed_pod("default", "web-3", "worker-7"))
            .fail_removal("web-1", 500)
            .fail_removal("web-2", 403);
        let drainer = drainer(&cluster, DrainOptions::default());

        let err = drainer.drain("worker-7").await.unwrap_err();
        assert!(!err.is_timeout());
        match &err {
            DrainError::PendingPods {
                source, pending, ..
            } => {
                match source.as_ref() {
                    DrainError::Aggregate { errors } => assert_eq!(errors.len(), 2),
                    other => panic!("unexpected source: {:?}", other),
                }
                assert_eq!(pending, &["default/web-1", "default/web-2"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(cluster.evictions(), vec!["web-3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_without_eviction_support() {
        let cluster = worker_7()
            .without_eviction_support()
            .rate_limit("web-1", None);
        let drainer = drainer(&cluster, DrainOptions::default());

        drainer.drain("worker-7").await.unwrap();
        // Deletions bypass PodDisruptionBudgets, so rate limits never apply.
        assert_eq!(cluster.deletions(), vec!["web-1", "web-2"]);
        assert!(cluster.evictions().is_empty());
        assert_eq!(cluster.pod_names_on("worker-7"), vec!["proxy-abc"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recreated_pods_count_as_gone() {
        let cluster = worker_7().recreate_on_removal();
        let drainer = drainer(&cluster, DrainOptions::default());

        drainer.drain("worker-7").await.unwrap();
        let recreated = cluster.pod("web-1").unwrap();
        assert_ne!(recreated.metadata.uid.as_deref(), Some("web-1-0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_preconditions_abort_before_removal() {
        let cluster = worker_7().with_pod(fake::unmanaged_pod("default", "lonely", "worker-7"));
        let drainer = drainer(&cluster, DrainOptions::default());

        let err = drainer.drain("worker-7").await.unwrap_err();
        assert!(matches!(err, DrainError::Preconditions { .. }), "{}", err);
        assert!(err.to_string().contains("default/lonely"));
        assert!(cluster.is_cordoned("worker-7"));
        assert!(cluster.evictions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_delay() {
        let cluster = worker_7();
        let drainer = drainer(
            &cluster,
            DrainOptions {
                drain_delay: Duration::from_secs(90),
                ..Default::default()
            },
        );
        let start = Instant::now();

        drainer.drain("worker-7").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_waits() {
        let cluster = worker_7().rate_limit("web-1", Some(100));
        let drainer = drainer(
            &cluster,
            DrainOptions {
                timeout: Duration::ZERO,
                ..Default::default()
            },
        );

        drainer.drain("worker-7").await.unwrap();
        assert_eq!(cluster.pod_names_on("worker-7"), vec!["proxy-abc"]);
    }
}
