use kubedrainer::config::{Args, Command, Settings, VERSION};
use kubedrainer::error::{self, Result};
use kubedrainer::hookhandler::{HookHandler, HookOptions};
use kubedrainer::nodeinfo::resolve_instance;
use models::autoscaling::metadata::DEFAULT_METADATA_ENDPOINT;
use models::autoscaling::AwsAutoScalingClient;
use models::node::{K8SClusterClient, NodeDrainer};
use models::telemetry;

use kube::config::{KubeConfigOptions, Kubeconfig};
use snafu::{OptionExt, ResultExt};
use std::process;
use tracing::{event, Level};

#[tokio::main]
async fn main() {
    let args: Args = argh::from_env();
    if args.version {
        println!("kubedrainer {}", VERSION);
        return;
    }
    if let Err(error) = run(args).await {
        eprintln!("{}", error);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let command = args.command.as_ref().context(error::MissingCommandSnafu)?;
    telemetry::init_telemetry_from_env().context(error::TelemetryConfigurationSnafu)?;

    let settings = Settings::load(&args)?;
    let node_name = settings.node.clone().context(error::MissingNodeNameSnafu)?;
    let k8s_client = k8s_client(&settings).await?;
    let drainer = NodeDrainer::new(K8SClusterClient::new(k8s_client), settings.drain.clone());

    match command {
        Command::Drain(_) => {
            drainer
                .drain_node(&node_name)
                .await
                .context(error::DrainSnafu)?;
        }
        Command::Serve(_) => {
            let identity = resolve_instance(
                &drainer,
                &node_name,
                &settings.serve,
                DEFAULT_METADATA_ENDPOINT,
            )
            .await?;
            let autoscaling =
                AwsAutoScalingClient::new(&identity.region, settings.serve.profile.as_deref())
                    .await;

            let mut handler = HookHandler::new(
                drainer,
                autoscaling,
                HookOptions {
                    node_name,
                    instance_id: identity.instance_id,
                    loop_sleep: settings.serve.loop_sleep,
                    shutdown_sleep: settings.serve.shutdown_sleep,
                    force_loop_break: settings.serve.force_loop_break,
                },
            );
            handler.run().await;
            event!(Level::INFO, "Lifecycle hook handled, exiting");
        }
    }
    Ok(())
}

/// Uses the given kubeconfig and context, or the standard kubeconfig / in-cluster lookup.
async fn k8s_client(settings: &Settings) -> Result<kube::Client> {
    let options = KubeConfigOptions {
        context: settings.context.clone(),
        ..Default::default()
    };
    let config = match (&settings.kubeconfig, &settings.context) {
        (Some(path), _) => {
            let kubeconfig = Kubeconfig::read_from(path).context(error::KubeconfigSnafu)?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .context(error::KubeconfigSnafu)?
        }
        (None, Some(_)) => kube::Config::from_kubeconfig(&options)
            .await
            .context(error::KubeconfigSnafu)?,
        (None, None) => {
            return kube::Client::try_default()
                .await
                .context(error::ClientCreateSnafu)
        }
    };
    kube::Client::try_from(config).context(error::ClientCreateSnafu)
}
