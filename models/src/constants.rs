/// Prefix of every environment variable read by kubedrainer.
pub const ENV_PREFIX: &str = "KUBEDRAINER_";
pub const CONFIG_FILE_NAME: &str = ".kubedrainer.yaml";

// Well-known Kubernetes names consulted while selecting pods.
pub const DAEMON_SET_KIND: &str = "DaemonSet";
pub const MIRROR_POD_ANNOTATION: &str = "kubernetes.io/config.mirror";
pub const POLICY_API_GROUP: &str = "policy";
pub const EVICTION_SUBRESOURCE: &str = "pods/eviction";
pub const EVICTION_KIND: &str = "Eviction";

// Pod phases which indicate that a pod will never run again.
pub const POD_PHASE_SUCCEEDED: &str = "Succeeded";
pub const POD_PHASE_FAILED: &str = "Failed";

// Auto scaling constants
pub const LIFECYCLE_ACTION_CONTINUE: &str = "CONTINUE";
pub const AWS_PROVIDER_NAME: &str = "aws";
