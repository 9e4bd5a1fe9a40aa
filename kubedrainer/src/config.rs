//! Command line arguments and the layered settings resolved from them.
//!
//! Every setting is taken from the first source which provides it: a command line flag, a
//! `KUBEDRAINER_<NAME>` environment variable, the YAML config file, then the built-in default.
use crate::error::{self, Result};
use models::constants::{CONFIG_FILE_NAME, ENV_PREFIX};
use models::node::DrainOptions;

use argh::FromArgs;
use serde::Deserialize;
use snafu::ResultExt;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fs};
use tokio::time::Duration;

const DEFAULT_LOOP_SLEEP: Duration = Duration::from_secs(10);
const DEFAULT_SHUTDOWN_SLEEP: Duration = Duration::from_secs(6 * 60);

/// The version reported by `--version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(FromArgs, Debug, Default, PartialEq)]
/// Cordons and drains a Kubernetes Node, optionally driven by its EC2 Auto Scaling lifecycle.
pub struct Args {
    /// config file (default is $HOME/.kubedrainer.yaml)
    #[argh(option)]
    pub config: Option<PathBuf>,

    /// path to the kubeconfig file to use
    #[argh(option)]
    pub kubeconfig: Option<PathBuf>,

    /// name of the kubeconfig context to use
    #[argh(option)]
    pub context: Option<String>,

    /// continue even if there are Pods not managed by a controller
    #[argh(option)]
    pub force: Option<bool>,

    /// ignore DaemonSet-managed Pods (default true)
    #[argh(option)]
    pub ignore_daemonsets: Option<bool>,

    /// continue even if there are Pods using emptyDir (default true)
    #[argh(option)]
    pub delete_local_data: Option<bool>,

    /// seconds given to each Pod to terminate gracefully, negative uses the Pod's own value
    #[argh(option)]
    pub grace_period: Option<i64>,

    /// seconds to wait before giving up, zero means infinite (default 60)
    #[argh(option)]
    pub timeout: Option<u64>,

    /// label selector restricting the Nodes which may be drained
    #[argh(option)]
    pub selector: Option<String>,

    /// label selector restricting the Pods which are removed
    #[argh(option)]
    pub pod_selector: Option<String>,

    /// seconds to wait between cordoning and removing Pods
    #[argh(option)]
    pub drain_delay: Option<u64>,

    /// print the version and exit
    #[argh(switch)]
    pub version: bool,

    #[argh(subcommand)]
    pub command: Option<Command>,
}

#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand)]
pub enum Command {
    Drain(DrainArgs),
    Serve(ServeArgs),
}

#[derive(FromArgs, Debug, Default, PartialEq)]
/// Cordon and drain a Node once.
#[argh(subcommand, name = "drain")]
pub struct DrainArgs {
    /// name of the Node to drain
    #[argh(option)]
    pub node: Option<String>,
}

#[derive(FromArgs, Debug, Default, PartialEq)]
/// Drain the Node when its instance starts terminating, then complete the lifecycle hook.
#[argh(subcommand, name = "serve")]
pub struct ServeArgs {
    /// name of the Node to drain
    #[argh(positional)]
    pub node: Option<String>,

    /// EC2 instance ID backing the Node
    #[argh(option)]
    pub instance_id: Option<String>,

    /// AWS region of the instance
    #[argh(option)]
    pub region: Option<String>,

    /// AWS credentials profile
    #[argh(option)]
    pub profile: Option<String>,

    /// seconds between lifecycle state checks (default 10)
    #[argh(option)]
    pub loop_sleep: Option<u64>,

    /// seconds to wait for termination after completing the lifecycle hook (default 360)
    #[argh(option)]
    pub shutdown_sleep: Option<u64>,

    /// exit right after completing the lifecycle hook
    #[argh(option)]
    pub force_loop_break: Option<bool>,
}

/// The contents of the YAML config file.
#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileSettings {
    kubeconfig: Option<PathBuf>,
    context: Option<String>,
    force: Option<bool>,
    ignore_daemonsets: Option<bool>,
    delete_local_data: Option<bool>,
    grace_period: Option<i64>,
    timeout: Option<u64>,
    selector: Option<String>,
    pod_selector: Option<String>,
    drain_delay: Option<u64>,
    node: Option<String>,
    instance_id: Option<String>,
    region: Option<String>,
    profile: Option<String>,
    loop_sleep: Option<u64>,
    shutdown_sleep: Option<u64>,
    force_loop_break: Option<bool>,
}

impl FileSettings {
    /// Reads the file at `path`, or at the default location when no path is given. Only an
    /// explicitly named file is required to exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match env::var_os("HOME") {
                Some(home) => (PathBuf::from(home).join(CONFIG_FILE_NAME), false),
                None => return Ok(Self::default()),
            },
        };
        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let contents =
            fs::read_to_string(&path).context(error::ReadConfigFileSnafu { path: &path })?;
        Self::parse(&contents, &path)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).context(error::ParseConfigFileSnafu { path })
    }
}

/// The Auto Scaling side of `serve`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServeSettings {
    pub instance_id: Option<String>,
    pub region: Option<String>,
    pub profile: Option<String>,
    pub loop_sleep: Duration,
    pub shutdown_sleep: Duration,
    pub force_loop_break: bool,
}

/// Fully resolved settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub node: Option<String>,
    pub drain: DrainOptions,
    pub serve: ServeSettings,
}

impl Settings {
    /// Resolves settings against the process environment and config file.
    pub fn load(args: &Args) -> Result<Self> {
        let file = FileSettings::load(args.config.as_deref())?;
        Self::resolve(args, &file, |name| env::var(name).ok())
    }

    fn resolve<E>(args: &Args, file: &FileSettings, env: E) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        let layers = Layers { env };
        let default_serve = ServeArgs::default();
        let (node_flag, serve_args) = match &args.command {
            Some(Command::Serve(serve)) => (serve.node.clone(), serve),
            Some(Command::Drain(drain)) => (drain.node.clone(), &default_serve),
            None => (None, &default_serve),
        };

        let defaults = DrainOptions::default();
        let grace_period = layers.value("grace-period", args.grace_period, file.grace_period)?;
        let drain = DrainOptions {
            force: layers
                .value("force", args.force, file.force)?
                .unwrap_or(defaults.force),
            ignore_all_daemon_sets: layers
                .value(
                    "ignore-daemonsets",
                    args.ignore_daemonsets,
                    file.ignore_daemonsets,
                )?
                .unwrap_or(defaults.ignore_all_daemon_sets),
            delete_local_data: layers
                .value(
                    "delete-local-data",
                    args.delete_local_data,
                    file.delete_local_data,
                )?
                .unwrap_or(defaults.delete_local_data),
            grace_period_seconds: grace_period_seconds(grace_period)?,
            timeout: layers
                .value("timeout", args.timeout, file.timeout)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            selector: layers.value("selector", args.selector.clone(), file.selector.clone())?,
            pod_selector: layers.value(
                "pod-selector",
                args.pod_selector.clone(),
                file.pod_selector.clone(),
            )?,
            drain_delay: layers
                .value("drain-delay", args.drain_delay, file.drain_delay)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.drain_delay),
        };

        let serve = ServeSettings {
            instance_id: layers.value(
                "instance-id",
                serve_args.instance_id.clone(),
                file.instance_id.clone(),
            )?,
            region: layers.value("region", serve_args.region.clone(), file.region.clone())?,
            profile: layers.value("profile", serve_args.profile.clone(), file.profile.clone())?,
            loop_sleep: layers
                .value("loop-sleep", serve_args.loop_sleep, file.loop_sleep)?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_LOOP_SLEEP),
            shutdown_sleep: layers
                .value("shutdown-sleep", serve_args.shutdown_sleep, file.shutdown_sleep)?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SHUTDOWN_SLEEP),
            force_loop_break: layers
                .value(
                    "force-loop-break",
                    serve_args.force_loop_break,
                    file.force_loop_break,
                )?
                .unwrap_or(false),
        };

        Ok(Settings {
            kubeconfig: layers.value(
                "kubeconfig",
                args.kubeconfig.clone(),
                file.kubeconfig.clone(),
            )?,
            context: layers.value("context", args.context.clone(), file.context.clone())?,
            node: layers.value("node", node_flag, file.node.clone())?,
            drain,
            serve,
        })
    }
}

struct Layers<E> {
    env: E,
}

impl<E> Layers<E>
where
    E: Fn(&str) -> Option<String>,
{
    /// The flag if given, else the environment variable, else the file's value.
    fn value<T>(&self, key: &str, flag: Option<T>, file: Option<T>) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        if flag.is_some() {
            return Ok(flag);
        }
        match (self.env)(&env_var_name(key)) {
            Some(value) if !value.is_empty() => value
                .parse()
                .map(Some)
                .map_err(|err: T::Err| error::Error::InvalidValue {
                    key: env_var_name(key),
                    value: value.clone(),
                    message: err.to_string(),
                }),
            _ => Ok(file),
        }
    }
}

/// `grace-period` becomes `KUBEDRAINER_GRACE_PERIOD`.
fn env_var_name(key: &str) -> String {
    format!("{}{}", ENV_PREFIX, key.replace('-', "_").to_uppercase())
}

fn grace_period_seconds(grace_period: Option<i64>) -> Result<Option<u32>> {
    match grace_period {
        Some(seconds) if seconds >= 0 => u32::try_from(seconds)
            .map(Some)
            .map_err(|err| error::Error::InvalidValue {
                key: "grace-period".to_string(),
                value: seconds.to_string(),
                message: err.to_string(),
            }),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn serve_args(node: &str) -> Args {
        Args {
            command: Some(Command::Serve(ServeArgs {
                node: Some(node.to_string()),
                ..Default::default()
            })),
            ..Default::default()
        }
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings =
            Settings::resolve(&Args::default(), &FileSettings::default(), env(&[])).unwrap();

        assert_eq!(settings.drain, DrainOptions::default());
        assert_eq!(settings.drain.grace_period_seconds, None);
        assert_eq!(settings.drain.timeout, Duration::from_secs(60));
        assert!(settings.drain.ignore_all_daemon_sets);
        assert!(settings.drain.delete_local_data);
        assert_eq!(settings.serve.loop_sleep, Duration::from_secs(10));
        assert_eq!(settings.serve.shutdown_sleep, Duration::from_secs(360));
        assert!(!settings.serve.force_loop_break);
        assert_eq!(settings.node, None);
    }

    #[test]
    fn test_precedence() {
        let file = FileSettings::parse(
            "timeout: 120\ndrain-delay: 15\nregion: eu-west-1\nnode: from-file\n",
            Path::new("test.yaml"),
        )
        .unwrap();
        let mut args = serve_args("from-flag");
        args.timeout = Some(30);

        let settings = Settings::resolve(
            &args,
            &file,
            env(&[
                ("KUBEDRAINER_TIMEOUT", "45"),
                ("KUBEDRAINER_DRAIN_DELAY", "20"),
                ("KUBEDRAINER_FORCE", "true"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.drain.timeout, Duration::from_secs(30));
        assert_eq!(settings.drain.drain_delay, Duration::from_secs(20));
        assert!(settings.drain.force);
        assert_eq!(settings.serve.region.as_deref(), Some("eu-west-1"));
        assert_eq!(settings.node.as_deref(), Some("from-flag"));
    }

    #[test]
    fn test_drain_node_from_env() {
        let settings = Settings::resolve(
            &Args::default(),
            &FileSettings::default(),
            env(&[("KUBEDRAINER_NODE", "worker-7")]),
        )
        .unwrap();
        assert_eq!(settings.node.as_deref(), Some("worker-7"));
    }

    #[test]
    fn test_grace_period() {
        let mut args = Args::default();
        args.grace_period = Some(-1);
        let settings = Settings::resolve(&args, &FileSettings::default(), env(&[])).unwrap();
        assert_eq!(settings.drain.grace_period_seconds, None);

        args.grace_period = Some(30);
        let settings = Settings::resolve(&args, &FileSettings::default(), env(&[])).unwrap();
        assert_eq!(settings.drain.grace_period_seconds, Some(30));
    }

    #[test]
    fn test_invalid_env_value() {
        let err = Settings::resolve(
            &Args::default(),
            &FileSettings::default(),
            env(&[("KUBEDRAINER_TIMEOUT", "soon")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("KUBEDRAINER_TIMEOUT"), "{}", err);
    }

    #[test]
    fn test_file_rejects_unknown_keys() {
        assert!(FileSettings::parse("", Path::new("empty.yaml")).is_ok());
        assert!(matches!(
            FileSettings::parse("timout: 5\n", Path::new("typo.yaml")),
            Err(error::Error::ParseConfigFile { .. })
        ));
    }

    #[test]
    fn test_command_line() {
        let args = Args::from_args(
            &["kubedrainer"],
            &[
                "--timeout",
                "0",
                "--ignore-daemonsets",
                "false",
                "serve",
                "worker-7",
                "--instance-id",
                "i-0123",
                "--force-loop-break",
                "true",
            ],
        )
        .unwrap();

        let settings = Settings::resolve(&args, &FileSettings::default(), env(&[])).unwrap();
        assert_eq!(settings.drain.timeout, Duration::ZERO);
        assert!(!settings.drain.ignore_all_daemon_sets);
        assert_eq!(settings.node.as_deref(), Some("worker-7"));
        assert_eq!(settings.serve.instance_id.as_deref(), Some("i-0123"));
        assert!(settings.serve.force_loop_break);
    }

    #[test]
    fn test_version_flag() {
        let args = Args::from_args(&["kubedrainer"], &["--version"]).unwrap();
        assert!(args.version);
        assert_eq!(args.command, None);

        let args = Args::from_args(&["kubedrainer"], &["drain", "--node", "worker-7"]).unwrap();
        assert!(!args.version);
        assert!(matches!(args.command, Some(Command::Drain(_))));
    }
}
