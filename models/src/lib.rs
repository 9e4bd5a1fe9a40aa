pub mod autoscaling;
pub mod constants;
pub mod node;
pub mod telemetry;
