use reqwest::StatusCode;
use snafu::Snafu;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, DrainError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DrainError {
    #[snafu(display("Node name cannot be empty"))]
    EmptyNodeName,

    #[snafu(display("Unable to list Nodes: '{}'", source))]
    ListNodes { source: kube::Error },

    #[snafu(display("Node '{}' not found, got: '{}'", node_name, available.join(", ")))]
    NodeNotFound {
        node_name: String,
        available: Vec<String>,
    },

    #[snafu(display("Unable to cordon Node '{}': '{}'", node_name, source))]
    CordonNode {
        node_name: String,
        source: kube::Error,
    },

    #[snafu(display("Unable to determine whether the cluster supports eviction: '{}'", source))]
    CheckEvictionSupport { source: kube::Error },

    #[snafu(display("Unable to list Pods on Node '{}': '{}'", node_name, source))]
    ListPods {
        node_name: String,
        source: kube::Error,
    },

    #[snafu(display("Unable to look up DaemonSet '{}/{}': '{}'", namespace, name, source))]
    DaemonSetLookup {
        namespace: String,
        name: String,
        source: kube::Error,
    },

    #[snafu(display("Cannot drain Node '{}': [{}]", node_name, violations.join(", ")))]
    Preconditions {
        node_name: String,
        violations: Vec<String>,
    },

    #[snafu(display("Error when evicting Pod '{}': '{}'", pod_name, source))]
    EvictPod {
        pod_name: String,
        source: kube::Error,
    },

    #[snafu(display("Error when deleting Pod '{}': '{}'", pod_name, source))]
    DeletePod {
        pod_name: String,
        source: kube::Error,
    },

    #[snafu(display("Error when waiting for Pod '{}' to terminate: '{}'", pod_name, source))]
    WaitForPod {
        pod_name: String,
        source: kube::Error,
    },

    #[snafu(display(
        "Pods [{}] were not deleted in the time allocated ({:.2}s)",
        pod_names.join(", "),
        max_wait.as_secs_f64()
    ))]
    WaitForDeletion {
        pod_names: Vec<String>,
        max_wait: Duration,
    },

    #[snafu(display("Pod removal stopped with {} Pods unaccounted for", remaining))]
    RemovalAborted { remaining: usize },

    #[snafu(display("Drain did not complete within {:?}", timeout))]
    DrainTimeout { timeout: Duration },

    #[snafu(display(
        "[{}]",
        errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    ))]
    Aggregate { errors: Vec<DrainError> },

    #[snafu(display(
        "There are pending Pods on Node '{}' when an error occurred: '{}'. Pending Pods: [{}]{}",
        node_name,
        source,
        pending.join(", "),
        if enumeration_errors.is_empty() {
            String::new()
        } else {
            format!(". Following errors also occurred: [{}]", enumeration_errors.join(", "))
        }
    ))]
    PendingPods {
        node_name: String,
        source: Box<DrainError>,
        pending: Vec<String>,
        enumeration_errors: Vec<String>,
    },
}

impl DrainError {
    /// Whether the drain gave up because its deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::DrainTimeout { .. } | Self::WaitForDeletion { .. } => true,
            Self::PendingPods { source, .. } => source.is_timeout(),
            Self::Aggregate { errors } => errors.iter().any(DrainError::is_timeout),
            _ => false,
        }
    }

    /// The Pods which were still on the Node when the drain failed.
    pub fn pending_pods(&self) -> &[String] {
        match self {
            Self::PendingPods { pending, .. } => pending,
            _ => &[],
        }
    }

    pub(crate) fn is_conflict(&self) -> bool {
        match self {
            Self::CordonNode { source, .. } => is_conflict(source),
            _ => false,
        }
    }
}

fn api_status(err: &kube::Error) -> Option<StatusCode> {
    match err {
        kube::Error::Api(response) => StatusCode::from_u16(response.code).ok(),
        _ => None,
    }
}

pub(crate) fn is_not_found(err: &kube::Error) -> bool {
    api_status(err) == Some(StatusCode::NOT_FOUND)
}

/// A 429 is returned for evictions which would violate a PodDisruptionBudget.
pub(crate) fn is_too_many_requests(err: &kube::Error) -> bool {
    api_status(err) == Some(StatusCode::TOO_MANY_REQUESTS)
}

pub(crate) fn is_conflict(err: &kube::Error) -> bool {
    api_status(err) == Some(StatusCode::CONFLICT)
}
