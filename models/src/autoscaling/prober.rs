use super::client::AutoScalingClient;
use super::error::{self, Result};
use super::LifecycleState;

use snafu::{ensure, OptionExt};
use tracing::{event, instrument, Level};

/// The lifecycle state of the instance and the name of its Auto Scaling group.
///
/// The instance must be described by exactly one record which names a group.
#[instrument(skip(client), err)]
pub async fn instance_status_and_group<A: AutoScalingClient + ?Sized>(
    client: &A,
    instance_id: &str,
) -> Result<(LifecycleState, String)> {
    let mut instances = client.describe_auto_scaling_instances(instance_id).await?;
    ensure!(
        instances.len() == 1,
        error::InstanceCountSnafu {
            instance_id,
            count: instances.len(),
        }
    );

    let instance = instances.remove(0);
    let group_name = instance
        .group_name
        .context(error::MissingGroupSnafu { instance_id })?;
    event!(
        Level::DEBUG,
        state = %instance.lifecycle_state,
        group = %group_name,
        "Described Auto Scaling instance '{}'",
        instance_id
    );
    Ok((instance.lifecycle_state, group_name))
}

/// The name of the lifecycle hook registered on the group. Exactly one hook must exist.
#[instrument(skip(client), err)]
pub async fn lifecycle_hook_name<A: AutoScalingClient + ?Sized>(
    client: &A,
    group_name: &str,
) -> Result<String> {
    let mut hooks = client.describe_lifecycle_hooks(group_name).await?;
    ensure!(
        hooks.len() == 1,
        error::LifecycleHookCountSnafu { group_name, hooks }
    );
    Ok(hooks.remove(0))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::autoscaling::{AutoScalingError, AutoScalingInstance, MockAutoScalingClient};
    use mockall::predicate::*;

    fn instance(group_name: Option<&str>, state: LifecycleState) -> AutoScalingInstance {
        AutoScalingInstance {
            instance_id: "i-0123".to_string(),
            group_name: group_name.map(str::to_string),
            lifecycle_state: state,
        }
    }

    #[tokio::test]
    async fn test_status_and_group() {
        let mut client = MockAutoScalingClient::new();
        client
            .expect_describe_auto_scaling_instances()
            .with(eq("i-0123"))
            .times(1)
            .returning(|_| {
                Ok(vec![instance(
                    Some("web-asg"),
                    LifecycleState::TerminatingWait,
                )])
            });

        assert_eq!(
            instance_status_and_group(&client, "i-0123").await.unwrap(),
            (LifecycleState::TerminatingWait, "web-asg".to_string())
        );
    }

    #[tokio::test]
    async fn test_status_requires_exactly_one_instance() {
        let mut client = MockAutoScalingClient::new();
        client
            .expect_describe_auto_scaling_instances()
            .times(1)
            .returning(|_| Ok(vec![]));
        client
            .expect_describe_auto_scaling_instances()
            .times(1)
            .returning(|_| {
                Ok(vec![
                    instance(Some("web-asg"), LifecycleState::InService),
                    instance(Some("web-asg"), LifecycleState::InService),
                ])
            });

        assert!(matches!(
            instance_status_and_group(&client, "i-0123").await,
            Err(AutoScalingError::InstanceCount { count: 0, .. })
        ));
        assert!(matches!(
            instance_status_and_group(&client, "i-0123").await,
            Err(AutoScalingError::InstanceCount { count: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_status_requires_group() {
        let mut client = MockAutoScalingClient::new();
        client
            .expect_describe_auto_scaling_instances()
            .returning(|_| Ok(vec![instance(None, LifecycleState::Detached)]));

        assert!(matches!(
            instance_status_and_group(&client, "i-0123").await,
            Err(AutoScalingError::MissingGroup { .. })
        ));
    }

    #[tokio::test]
    async fn test_hook_name() {
        let mut client = MockAutoScalingClient::new();
        client
            .expect_describe_lifecycle_hooks()
            .with(eq("web-asg"))
            .returning(|_| Ok(vec!["drain-hook".to_string()]));

        assert_eq!(
            lifecycle_hook_name(&client, "web-asg").await.unwrap(),
            "drain-hook"
        );
    }

    #[tokio::test]
    async fn test_ambiguous_hooks() {
        let mut client = MockAutoScalingClient::new();
        client
            .expect_describe_lifecycle_hooks()
            .returning(|_| Ok(vec!["drain-hook".to_string(), "audit-hook".to_string()]));

        let err = lifecycle_hook_name(&client, "web-asg").await.unwrap_err();
        assert!(matches!(err, AutoScalingError::LifecycleHookCount { .. }));
        assert!(err.to_string().contains("drain-hook, audit-hook"));
    }
}
