//! Reading and completing EC2 Auto Scaling lifecycle state for the instance backing a Node.
mod client;
mod error;
pub mod metadata;
mod prober;

pub use self::client::*;
pub use self::error::{AutoScalingError, Result};
pub use self::prober::{instance_status_and_group, lifecycle_hook_name};

use strum_macros::{Display, EnumString};

/// The lifecycle state Auto Scaling reports for an instance.
///
/// See https://docs.aws.amazon.com/autoscaling/ec2/userguide/ec2-auto-scaling-lifecycle.html
#[derive(Copy, Clone, Debug, Eq, PartialEq, Display, EnumString)]
pub enum LifecycleState {
    Pending,
    #[strum(serialize = "Pending:Wait")]
    PendingWait,
    #[strum(serialize = "Pending:Proceed")]
    PendingProceed,
    Quarantined,
    InService,
    Terminating,
    /// Termination is paused until the lifecycle hook is completed.
    #[strum(serialize = "Terminating:Wait")]
    TerminatingWait,
    #[strum(serialize = "Terminating:Proceed")]
    TerminatingProceed,
    Terminated,
    Detaching,
    Detached,
    EnteringStandby,
    Standby,
    ExitingStandby,
    Unknown,
}

impl LifecycleState {
    /// Whether the instance is on its way out of the group.
    pub fn is_terminating(&self) -> bool {
        matches!(
            self,
            Self::Terminating | Self::TerminatingWait | Self::TerminatingProceed
        )
    }

    /// Whether termination is paused awaiting the lifecycle hook.
    pub fn is_terminating_wait(&self) -> bool {
        *self == Self::TerminatingWait
    }
}

/// An instance's membership in an Auto Scaling group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AutoScalingInstance {
    pub instance_id: String,
    pub group_name: Option<String>,
    pub lifecycle_state: LifecycleState,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lifecycle_states() {
        assert_eq!(
            "InService".parse::<LifecycleState>().unwrap(),
            LifecycleState::InService
        );
        assert_eq!(
            "Terminating:Wait".parse::<LifecycleState>().unwrap(),
            LifecycleState::TerminatingWait
        );
        assert!("Warped:Away".parse::<LifecycleState>().is_err());
        assert_eq!(
            LifecycleState::TerminatingProceed.to_string(),
            "Terminating:Proceed"
        );

        assert!(LifecycleState::Terminating.is_terminating());
        assert!(LifecycleState::TerminatingWait.is_terminating());
        assert!(!LifecycleState::Terminated.is_terminating());
        assert!(!LifecycleState::InService.is_terminating());
        assert!(LifecycleState::TerminatingWait.is_terminating_wait());
        assert!(!LifecycleState::Terminating.is_terminating_wait());
    }
}
