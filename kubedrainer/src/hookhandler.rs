//! Follows the Auto Scaling lifecycle of the instance backing a Node.
//!
//! The handler polls the instance's lifecycle state. Once the instance starts terminating the Node
//! is drained, and once termination pauses on the lifecycle hook the hook is completed so that
//! Auto Scaling can go ahead with the termination.
use models::autoscaling::{
    instance_status_and_group, lifecycle_hook_name, AutoScalingClient, LifecycleState,
};
use models::node::Drainer;

use snafu::ResultExt;
use tokio::time::{sleep, Duration};
use tracing::{event, instrument, Level};

/// Identifies the instance to follow and paces the polling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookOptions {
    pub node_name: String,
    pub instance_id: String,
    pub loop_sleep: Duration,
    pub shutdown_sleep: Duration,
    /// Return right after completing the lifecycle hook instead of waiting for termination.
    pub force_loop_break: bool,
}

/// What a single poll accomplished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The instance is not terminating.
    NotTerminating(LifecycleState),
    /// The Node is drained but the lifecycle hook is not waiting yet.
    Drained(LifecycleState),
    /// The lifecycle hook was completed.
    HookCompleted,
}

pub struct HookHandler<D: Drainer, A: AutoScalingClient> {
    drainer: D,
    autoscaling: A,
    options: HookOptions,
    drained: bool,
    // (group name, hook name)
    hook: Option<(String, String)>,
}

impl<D: Drainer, A: AutoScalingClient> HookHandler<D, A> {
    pub fn new(drainer: D, autoscaling: A, options: HookOptions) -> Self {
        HookHandler {
            drainer,
            autoscaling,
            options,
            drained: false,
            hook: None,
        }
    }

    /// Whether the Node has been drained by this handler.
    pub fn drained(&self) -> bool {
        self.drained
    }

    /// Polls until the lifecycle hook has been completed, then waits out the shutdown sleep.
    /// Failures are logged and retried on the next poll.
    pub async fn run(&mut self) {
        event!(
            Level::INFO,
            node = %self.options.node_name,
            instance = %self.options.instance_id,
            "Watching Auto Scaling lifecycle"
        );
        loop {
            sleep(self.options.loop_sleep).await;
            match self.tick().await {
                Ok(TickOutcome::HookCompleted) => break,
                Ok(outcome) => {
                    event!(Level::DEBUG, ?outcome, "Lifecycle hook not yet completed");
                }
                Err(err) => {
                    event!(Level::WARN, %err, "Lifecycle poll failed, will retry");
                }
            }
        }

        if self.options.force_loop_break {
            return;
        }
        event!(
            Level::INFO,
            "Waiting {:.2}s for the instance to terminate",
            self.options.shutdown_sleep.as_secs_f64()
        );
        sleep(self.options.shutdown_sleep).await;
    }

    /// Performs a single poll.
    #[instrument(skip(self), err)]
    pub async fn tick(&mut self) -> hookhandler_error::Result<TickOutcome> {
        let (state, group_name) =
            instance_status_and_group(&self.autoscaling, &self.options.instance_id)
                .await
                .context(hookhandler_error::InstanceStatusSnafu)?;
        if !state.is_terminating() {
            return Ok(TickOutcome::NotTerminating(state));
        }

        if !self.drained {
            event!(Level::INFO, %state, "Instance is terminating, draining Node");
            self.drainer
                .drain(&self.options.node_name)
                .await
                .context(hookhandler_error::DrainSnafu)?;
            self.drained = true;
        }

        if !state.is_terminating_wait() {
            return Ok(TickOutcome::Drained(state));
        }

        let hook_name = self.hook_name(&group_name).await?;
        self.autoscaling
            .complete_lifecycle_action(&group_name, &hook_name, &self.options.instance_id)
            .await
            .context(hookhandler_error::CompleteHookSnafu)?;
        event!(
            Level::INFO,
            group = %group_name,
            hook = %hook_name,
            "Completed lifecycle hook"
        );
        Ok(TickOutcome::HookCompleted)
    }

    async fn hook_name(&mut self, group_name: &str) -> hookhandler_error::Result<String> {
        if let Some((cached_group, hook_name)) = &self.hook {
            if cached_group == group_name {
                return Ok(hook_name.clone());
            }
        }
        let hook_name = lifecycle_hook_name(&self.autoscaling, group_name)
            .await
            .context(hookhandler_error::HookNameSnafu)?;
        self.hook = Some((group_name.to_string(), hook_name.clone()));
        Ok(hook_name)
    }
}

pub mod hookhandler_error {
    use models::autoscaling::AutoScalingError;
    use models::node::DrainError;
    use snafu::Snafu;

    pub type Result<T> = std::result::Result<T, Error>;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum Error {
        #[snafu(display("Unable to get lifecycle state: '{}'", source))]
        InstanceStatus { source: AutoScalingError },

        #[snafu(display("Unable to drain Node: '{}'", source))]
        Drain { source: DrainError },

        #[snafu(display("Unable to find lifecycle hook: '{}'", source))]
        HookName { source: AutoScalingError },

        #[snafu(display("Unable to complete lifecycle hook: '{}'", source))]
        CompleteHook { source: AutoScalingError },
    }
}
