//! Decides whether Pods are removed with the Eviction API or by plain deletion.
//!
//! Evictions respect PodDisruptionBudgets, so they are always preferred. Clusters which do not serve
//! the `pods/eviction` subresource fall back to deleting Pods directly, as `kubectl drain` does.
use super::client::ClusterClient;
use super::error::{self, Result};
use crate::constants::{EVICTION_KIND, EVICTION_SUBRESOURCE, POLICY_API_GROUP};

use k8s_openapi::api::core::v1::Pod;
use snafu::ResultExt;
use tracing::{event, instrument, Level};

/// How Pods are removed from a Node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemovalPolicy {
    /// Create Evictions using the given `policy` group version.
    Evict { policy_group_version: String },
    /// Delete Pods directly.
    Delete,
}

impl RemovalPolicy {
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Evict { .. } => "evicted",
            Self::Delete => "deleted",
        }
    }

    /// Issue a single removal request for the Pod.
    pub async fn remove<T: ClusterClient>(
        &self,
        cluster: &T,
        pod: &Pod,
        grace_period_seconds: Option<u32>,
    ) -> kube::Result<()> {
        match self {
            Self::Evict { .. } => cluster.evict_pod(pod, grace_period_seconds).await,
            Self::Delete => cluster.delete_pod(pod, grace_period_seconds).await,
        }
    }
}

/// Returns the `policy` group version if the cluster supports Evictions. `None` means that Pods must
/// be deleted instead.
#[instrument(skip(cluster), err)]
pub async fn check_eviction_support<T: ClusterClient>(cluster: &T) -> Result<Option<String>> {
    let groups = cluster
        .api_groups()
        .await
        .context(error::CheckEvictionSupportSnafu)?;

    let policy_group_version = match groups
        .iter()
        .find(|group| group.name == POLICY_API_GROUP)
    {
        Some(group) => group
            .preferred_version
            .as_ref()
            .or_else(|| group.versions.first())
            .map(|version| version.group_version.clone()),
        None => None,
    };
    let policy_group_version = match policy_group_version {
        Some(version) => version,
        None => return Ok(None),
    };

    let resources = cluster
        .core_api_resources()
        .await
        .context(error::CheckEvictionSupportSnafu)?;
    let serves_evictions = resources
        .iter()
        .any(|resource| resource.name == EVICTION_SUBRESOURCE && resource.kind == EVICTION_KIND);

    Ok(serves_evictions.then_some(policy_group_version))
}

/// Picks the removal policy for the cluster.
pub async fn removal_policy<T: ClusterClient>(cluster: &T) -> Result<RemovalPolicy> {
    Ok(match check_eviction_support(cluster).await? {
        Some(policy_group_version) => {
            event!(
                Level::DEBUG,
                %policy_group_version,
                "Cluster supports evictions."
            );
            RemovalPolicy::Evict {
                policy_group_version,
            }
        }
        None => {
            event!(
                Level::WARN,
                "Cluster does not support evictions, Pods will be deleted directly."
            );
            RemovalPolicy::Delete
        }
    })
}
