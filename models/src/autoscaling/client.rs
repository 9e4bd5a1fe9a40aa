use super::error::{self, Result};
use super::{AutoScalingInstance, LifecycleState};
use crate::constants::LIFECYCLE_ACTION_CONTINUE;

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_autoscaling::config::Region;
use snafu::ResultExt;
use tracing::instrument;

#[cfg(any(feature = "mockall", test))]
use mockall::mock;

#[async_trait]
/// The Auto Scaling operations needed to follow an instance's lifecycle. This is provided as a trait
/// in order to allow mocks to be used for testing purposes.
pub trait AutoScalingClient: Send + Sync {
    /// Describe the group membership of an instance.
    async fn describe_auto_scaling_instances(
        &self,
        instance_id: &str,
    ) -> Result<Vec<AutoScalingInstance>>;
    /// The names of the lifecycle hooks registered on a group.
    async fn describe_lifecycle_hooks(&self, group_name: &str) -> Result<Vec<String>>;
    /// Let a paused lifecycle transition continue.
    async fn complete_lifecycle_action(
        &self,
        group_name: &str,
        hook_name: &str,
        instance_id: &str,
    ) -> Result<()>;
}

#[cfg(any(feature = "mockall", test))]
mock! {
    /// A Mock AutoScalingClient for use in tests.
    pub AutoScalingClient {}
    #[async_trait]
    impl AutoScalingClient for AutoScalingClient {
        async fn describe_auto_scaling_instances(
            &self,
            instance_id: &str,
        ) -> Result<Vec<AutoScalingInstance>>;
        async fn describe_lifecycle_hooks(&self, group_name: &str) -> Result<Vec<String>>;
        async fn complete_lifecycle_action(
            &self,
            group_name: &str,
            hook_name: &str,
            instance_id: &str,
        ) -> Result<()>;
    }
}

#[derive(Clone, Debug)]
/// Concrete implementation of the `AutoScalingClient` trait. This implementation will almost
/// certainly be used in any case that isn't a unit test.
pub struct AwsAutoScalingClient {
    client: aws_sdk_autoscaling::Client,
}

impl AwsAutoScalingClient {
    /// Loads credentials from the named profile, or the default chain when no profile is given.
    pub async fn new(region: &str, profile: Option<&str>) -> Self {
        let region_provider = RegionProviderChain::first_try(Some(Region::new(region.to_string())))
            .or_default_provider();
        let mut loader = aws_config::from_env().region(region_provider);
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let shared_config = loader.load().await;

        AwsAutoScalingClient {
            client: aws_sdk_autoscaling::Client::new(&shared_config),
        }
    }
}

#[async_trait]
impl AutoScalingClient for AwsAutoScalingClient {
    #[instrument(skip(self), err)]
    async fn describe_auto_scaling_instances(
        &self,
        instance_id: &str,
    ) -> Result<Vec<AutoScalingInstance>> {
        let output = self
            .client
            .describe_auto_scaling_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(aws_sdk_autoscaling::Error::from)
            .context(error::DescribeInstancesSnafu { instance_id })?;

        Ok(output
            .auto_scaling_instances()
            .unwrap_or_default()
            .iter()
            .map(|details| AutoScalingInstance {
                instance_id: details.instance_id().unwrap_or_default().to_string(),
                group_name: details.auto_scaling_group_name().map(str::to_string),
                lifecycle_state: details
                    .lifecycle_state()
                    .and_then(|state| state.parse().ok())
                    .unwrap_or(LifecycleState::Unknown),
            })
            .collect())
    }

    #[instrument(skip(self), err)]
    async fn describe_lifecycle_hooks(&self, group_name: &str) -> Result<Vec<String>> {
        let output = self
            .client
            .describe_lifecycle_hooks()
            .auto_scaling_group_name(group_name)
            .send()
            .await
            .map_err(aws_sdk_autoscaling::Error::from)
            .context(error::DescribeLifecycleHooksSnafu { group_name })?;

        Ok(output
            .lifecycle_hooks()
            .unwrap_or_default()
            .iter()
            .filter_map(|hook| hook.lifecycle_hook_name().map(str::to_string))
            .collect())
    }

    #[instrument(skip(self), err)]
    async fn complete_lifecycle_action(
        &self,
        group_name: &str,
        hook_name: &str,
        instance_id: &str,
    ) -> Result<()> {
        self.client
            .complete_lifecycle_action()
            .auto_scaling_group_name(group_name)
            .lifecycle_hook_name(hook_name)
            .instance_id(instance_id)
            .lifecycle_action_result(LIFECYCLE_ACTION_CONTINUE)
            .send()
            .await
            .map_err(aws_sdk_autoscaling::Error::from)
            .context(error::CompleteLifecycleActionSnafu {
                group_name,
                hook_name,
                instance_id,
            })?;
        Ok(())
    }
}
