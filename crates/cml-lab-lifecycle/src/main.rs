//! CML lab lifecycle CLI.
//!
//! Entry point of the `cml-lab` binary: lists and shows labs, and drives a
//! lab through its lifecycle from a JSON request file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use cml_lab_client::config::{
    ENV_CML_CACERT, ENV_CML_HOST, ENV_CML_PASS, ENV_CML_SKIP_VERIFY, ENV_CML_TOKEN, ENV_CML_USER,
};
use cml_lab_client::{Client, ClientConfig};
use cml_lab_core::{LabId, State};
use cml_lab_lifecycle::{LabLifecycle, LifecycleController, LifecycleRequest, Timeouts};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CML lab lifecycle tool.
#[derive(Parser, Debug)]
#[command(name = "cml-lab")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Controller URL.
    #[arg(long, env = ENV_CML_HOST)]
    host: Option<String>,

    /// Username for authentication.
    #[arg(long, env = ENV_CML_USER)]
    username: Option<String>,

    /// Password for authentication.
    #[arg(long, env = ENV_CML_PASS, hide_env_values = true)]
    password: Option<String>,

    /// Bearer token.
    #[arg(long, env = ENV_CML_TOKEN, hide_env_values = true)]
    token: Option<String>,

    /// Path to a PEM CA certificate.
    #[arg(long, env = ENV_CML_CACERT)]
    ca_cert: Option<PathBuf>,

    /// Accept any TLS certificate.
    #[arg(long, env = ENV_CML_SKIP_VERIFY)]
    skip_verify: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List lab ids.
    Labs,

    /// Print a lab with all of its elements as JSON.
    Show {
        /// Lab id.
        lab_id: LabId,
    },

    /// Create or adopt a lab from a JSON request file.
    Up {
        /// Lifecycle request file.
        request: PathBuf,
    },

    /// Move a lab to another state.
    State {
        /// Lab id.
        lab_id: LabId,

        /// Desired state: DEFINED_ON_CORE, STOPPED or STARTED.
        #[arg(value_parser = parse_state)]
        state: State,

        /// Do not wait for the lab to converge.
        #[arg(long)]
        no_wait: bool,
    },

    /// Stop and wipe a lab, then destroy it.
    Down {
        /// Lab id.
        lab_id: LabId,

        /// Leave the wiped lab on the controller.
        #[arg(long)]
        keep: bool,
    },
}

fn parse_state(s: &str) -> Result<State, String> {
    serde_json::from_value(serde_json::Value::String(s.to_ascii_uppercase()))
        .map_err(|_| format!("unknown state `{s}`"))
}

impl Args {
    /// Build the client configuration. Flags win; everything else, such as
    /// `CML_PASS64`, comes from the environment.
    fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let config = ClientConfig::from_lookup(|name| {
            let flag = match name {
                ENV_CML_HOST => self.host.clone(),
                ENV_CML_USER => self.username.clone(),
                ENV_CML_PASS => self.password.clone(),
                ENV_CML_TOKEN => self.token.clone(),
                ENV_CML_CACERT => self.ca_cert.as_ref().map(|p| p.display().to_string()),
                ENV_CML_SKIP_VERIFY => self.skip_verify.clone(),
                _ => None,
            };
            flag.or_else(|| std::env::var(name).ok())
        })?;
        Ok(config)
    }
}

fn read_request(path: &Path) -> anyhow::Result<LifecycleRequest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let request: LifecycleRequest = serde_json::from_str(&raw)
        .with_context(|| format!("invalid lifecycle request in {}", path.display()))?;
    request.validate()?;
    Ok(request)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cml_lab=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let client = Client::new(args.client_config()?)?;
    let controller = LifecycleController::new(client.clone());

    match args.command {
        Command::Labs => {
            for id in client.labs().await? {
                println!("{id}");
            }
        }
        Command::Show { lab_id } => {
            let lab = controller.read(&lab_id).await?;
            print_json(&lab)?;
        }
        Command::Up { request } => {
            let request = read_request(&request)?;
            let lab = controller.create(&request).await?;
            tracing::info!(lab_id = %lab.id, state = %lab.state, "Lab is up");
            print_json(&lab)?;
        }
        Command::State {
            lab_id,
            state,
            no_wait,
        } => {
            let current = controller.read(&lab_id).await?;
            let mut request = LifecycleRequest::adopt(lab_id).with_state(state);
            request.wait = !no_wait;
            let lab = controller.update(&current, &request).await?;
            print_json(&lab)?;
        }
        Command::Down { lab_id, keep } => {
            controller
                .delete(&lab_id, &Timeouts::default(), !keep)
                .await?;
            tracing::info!(lab_id = %lab_id, kept = keep, "Lab is down");
        }
    }

    Ok(())
}
