use snafu::Snafu;

pub type Result<T> = std::result::Result<T, AutoScalingError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AutoScalingError {
    #[snafu(display("Unable to describe Auto Scaling instance '{}': '{}'", instance_id, source))]
    DescribeInstances {
        instance_id: String,
        source: aws_sdk_autoscaling::Error,
    },

    #[snafu(display(
        "Unable to describe lifecycle hooks of Auto Scaling group '{}': '{}'",
        group_name,
        source
    ))]
    DescribeLifecycleHooks {
        group_name: String,
        source: aws_sdk_autoscaling::Error,
    },

    #[snafu(display(
        "Unable to complete lifecycle action '{}' of Auto Scaling group '{}' for instance '{}': '{}'",
        hook_name,
        group_name,
        instance_id,
        source
    ))]
    CompleteLifecycleAction {
        group_name: String,
        hook_name: String,
        instance_id: String,
        source: aws_sdk_autoscaling::Error,
    },

    #[snafu(display(
        "Expected exactly one Auto Scaling instance '{}', got {}",
        instance_id,
        count
    ))]
    InstanceCount { instance_id: String, count: usize },

    #[snafu(display("Instance '{}' does not belong to an Auto Scaling group", instance_id))]
    MissingGroup { instance_id: String },

    #[snafu(display(
        "Expected exactly one lifecycle hook for Auto Scaling group '{}', got [{}]",
        group_name,
        hooks.join(", ")
    ))]
    LifecycleHookCount {
        group_name: String,
        hooks: Vec<String>,
    },
}
