use snafu::Snafu;
use std::path::PathBuf;

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The crate-wide error type.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Unable to read config file '{}': '{}'", path.display(), source))]
    ReadConfigFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to parse config file '{}': '{}'", path.display(), source))]
    ParseConfigFile {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[snafu(display("Invalid value '{}' for '{}': {}", value, key, message))]
    InvalidValue {
        key: String,
        value: String,
        message: String,
    },

    #[snafu(display("No command given, use 'drain' or 'serve'"))]
    MissingCommand,

    #[snafu(display("No Node name given, use --node or {}NODE", models::constants::ENV_PREFIX))]
    MissingNodeName,

    #[snafu(display("Unable to load kubeconfig: '{}'", source))]
    Kubeconfig {
        source: kube::config::KubeconfigError,
    },

    #[snafu(display("Unable to create client: '{}'", source))]
    ClientCreate { source: kube::Error },

    #[snafu(display("Unable to drain Node: '{}'", source))]
    Drain { source: models::node::DrainError },

    #[snafu(display("Unable to look up Node '{}': '{}'", node_name, source))]
    NodeLookup {
        node_name: String,
        source: models::node::DrainError,
    },

    #[snafu(display("Unable to map Node '{}' to an instance: '{}'", node_name, source))]
    ProviderId {
        node_name: String,
        source: models::node::provider::ProviderIdError,
    },

    #[snafu(display(
        "Unable to determine the {} of the instance backing Node '{}', use --{}",
        what,
        node_name,
        flag
    ))]
    UnresolvedInstance {
        node_name: String,
        what: String,
        flag: String,
    },

    #[snafu(display("Error configuring logging: '{}'", source))]
    TelemetryConfiguration {
        source: models::telemetry::TelemetryConfigError,
    },
}
