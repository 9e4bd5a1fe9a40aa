//! Works out which EC2 instance backs the Node being served.
use crate::config::ServeSettings;
use crate::error::{self, Result};
use models::autoscaling::metadata::MetadataClient;
use models::node::provider::{parse_provider_id, InstanceIdentity};
use models::node::{ClusterClient, NodeDrainer};

use snafu::{OptionExt, ResultExt};
use tracing::{event, Level};

/// Fills in the instance ID and region which were not configured. Both are read from the Node's
/// provider ID when neither is configured, then from instance metadata for whatever is still
/// missing. Instance metadata being unavailable is not an error by itself.
pub async fn resolve_instance<T: ClusterClient>(
    drainer: &NodeDrainer<T>,
    node_name: &str,
    settings: &ServeSettings,
    metadata_endpoint: &str,
) -> Result<InstanceIdentity> {
    let mut instance_id = settings.instance_id.clone();
    let mut region = settings.region.clone();

    if instance_id.is_none() && region.is_none() {
        let node = drainer
            .get_node(node_name)
            .await
            .context(error::NodeLookupSnafu { node_name })?;
        match node.spec.and_then(|spec| spec.provider_id) {
            Some(provider_id) => {
                let identity =
                    parse_provider_id(&provider_id).context(error::ProviderIdSnafu { node_name })?;
                event!(
                    Level::INFO,
                    instance = %identity.instance_id,
                    region = %identity.region,
                    "Resolved instance from provider ID '{}'",
                    provider_id
                );
                instance_id = Some(identity.instance_id);
                region = Some(identity.region);
            }
            None => event!(Level::WARN, "Node '{}' has no provider ID", node_name),
        }
    }

    if instance_id.is_none() || region.is_none() {
        match metadata_identity(metadata_endpoint).await {
            Some(identity) => {
                instance_id = instance_id.or(Some(identity.instance_id));
                region = region.or(Some(identity.region));
            }
            None => event!(
                Level::WARN,
                "Instance metadata is unavailable, instance ID and region must be configured"
            ),
        }
    }

    Ok(InstanceIdentity {
        instance_id: instance_id.context(error::UnresolvedInstanceSnafu {
            node_name,
            what: "instance ID",
            flag: "instance-id",
        })?,
        region: region.context(error::UnresolvedInstanceSnafu {
            node_name,
            what: "region",
            flag: "region",
        })?,
    })
}

async fn metadata_identity(endpoint: &str) -> Option<InstanceIdentity> {
    let client = match MetadataClient::new(endpoint) {
        Ok(client) => client,
        Err(err) => {
            event!(Level::WARN, %err, "Unable to create instance metadata client");
            return None;
        }
    };
    match client.instance_identity().await {
        Ok(identity) => Some(identity),
        Err(err) => {
            event!(Level::WARN, %err, "Unable to read instance metadata");
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use models::node::fake::{self, FakeCluster};
    use models::node::DrainOptions;
    use std::collections::BTreeMap;
    use tokio::time::Duration;

    // Nothing listens on the discard port, so metadata lookups fail fast.
    const NO_METADATA: &str = "http://127.0.0.1:9";

    fn settings(instance_id: Option<&str>, region: Option<&str>) -> ServeSettings {
        ServeSettings {
            instance_id: instance_id.map(str::to_string),
            region: region.map(str::to_string),
            profile: None,
            loop_sleep: Duration::from_secs(10),
            shutdown_sleep: Duration::from_secs(360),
            force_loop_break: false,
        }
    }

    fn drainer(provider_id: Option<&str>) -> NodeDrainer<FakeCluster> {
        let cluster = FakeCluster::new().with_node_object(fake::node(
            "worker-7",
            BTreeMap::new(),
            provider_id,
        ));
        NodeDrainer::new(cluster, DrainOptions::default())
    }

    #[tokio::test]
    async fn test_resolves_from_provider_id() {
        let drainer = drainer(Some("aws:///us-west-2a/i-0123"));
        let identity = resolve_instance(&drainer, "worker-7", &settings(None, None), NO_METADATA)
            .await
            .unwrap();

        assert_eq!(identity.instance_id, "i-0123");
        assert_eq!(identity.region, "us-west-2");
    }

    #[tokio::test]
    async fn test_configured_values_win() {
        let drainer = drainer(Some("aws:///us-west-2a/i-0123"));
        let identity = resolve_instance(
            &drainer,
            "worker-7",
            &settings(Some("i-0456"), Some("eu-west-1")),
            NO_METADATA,
        )
        .await
        .unwrap();

        assert_eq!(identity.instance_id, "i-0456");
        assert_eq!(identity.region, "eu-west-1");
    }

    #[tokio::test]
    async fn test_unresolved_region() {
        let drainer = drainer(Some("aws:///us-west-2a/i-0123"));
        let err = resolve_instance(
            &drainer,
            "worker-7",
            &settings(Some("i-0456"), None),
            NO_METADATA,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, error::Error::UnresolvedInstance { .. }));
        assert!(err.to_string().contains("--region"), "{}", err);
    }

    #[tokio::test]
    async fn test_unsupported_provider() {
        let drainer = drainer(Some("gce://project/us-central1-a/worker-7"));
        assert!(matches!(
            resolve_instance(&drainer, "worker-7", &settings(None, None), NO_METADATA).await,
            Err(error::Error::ProviderId { .. })
        ));
    }
}
