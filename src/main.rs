use besunet::config::OrchestratorSettings;
use besunet::config_loader;
use besunet::docker::BollardRuntime;
use besunet::error::ErrorKind;
use besunet::orchestrator::NetworkManager;
use besunet::store::FsStore;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use env_logger::Env;
use log::{info, warn};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Provisioning utility for private Besu Clique networks on Docker
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Orchestrator settings file (YAML or JSON)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Workspace directory, overriding the settings file
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a network from a configuration file
    Create {
        #[arg(short, long)]
        config: PathBuf,
        /// Wait for every node to answer JSON-RPC
        #[arg(long)]
        wait: bool,
    },
    /// Add a node to a running network
    AddNode {
        #[arg(short, long)]
        network: String,
        /// Node configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Remove a node from a network
    RemoveNode {
        #[arg(short, long)]
        network: String,
        #[arg(long)]
        node: String,
    },
    /// Tear a network down
    Stop {
        #[arg(short, long)]
        network: String,
    },
    /// Show node status (all nodes when --node is omitted)
    Status {
        #[arg(short, long)]
        network: String,
        #[arg(long)]
        node: Option<String>,
    },
    /// Wait for nodes to answer JSON-RPC
    WaitReady {
        #[arg(short, long)]
        network: String,
        #[arg(long)]
        node: Option<String>,
        /// Timeout in seconds, overriding the settings file
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// List tracked networks
    List,
    /// Suggest unused values for a configuration
    Suggest {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Check that the Docker daemon answers
    Ping,
}

type Manager = NetworkManager<BollardRuntime, FsStore>;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).wrap_err("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

/// Cancellation flag flipped by Ctrl-C
fn ctrl_c_cancel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            let _ = tx.send(true);
        }
    });
    rx
}

fn prepare_settings(args: &Args) -> Result<OrchestratorSettings> {
    let mut settings = config_loader::load_settings(args.settings.as_deref())
        .wrap_err("Failed to load orchestrator settings")?;
    if let Some(workspace) = &args.workspace {
        settings.workspace_root = workspace.clone();
    }

    // Bind mounts need absolute host paths
    fs::create_dir_all(&settings.workspace_root).wrap_err_with(|| {
        format!("Failed to create workspace '{}'", settings.workspace_root.display())
    })?;
    settings.workspace_root = fs::canonicalize(&settings.workspace_root).wrap_err_with(|| {
        format!("Failed to resolve workspace '{}'", settings.workspace_root.display())
    })?;
    Ok(settings)
}

async fn run(manager: &Manager, command: Command) -> Result<()> {
    match command {
        Command::Create { config, wait } => {
            let config = config_loader::load_network_config(&config)?;
            let network_id = config.network_id.clone();
            match manager.create_network(config.clone()).await {
                Ok(info) => {
                    print_json(&info)?;
                    if wait {
                        manager.wait_until_network_ready(&network_id, ctrl_c_cancel()).await?;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Validation => {
                    let suggestions = manager.suggest_alternatives(&config)?;
                    warn!("Network {} was rejected; alternatives follow", network_id);
                    print_json(&suggestions)?;
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::AddNode { network, config } => {
            let node = config_loader::load_node_config(&config)?;
            let container = manager.add_node(&network, node).await?;
            print_json(&container)?;
        }
        Command::RemoveNode { network, node } => {
            manager.remove_node(&network, &node).await?;
            info!("Node {} removed from {}", node, network);
        }
        Command::Stop { network } => {
            let report = manager.stop_network(&network).await?;
            print_json(&report)?;
        }
        Command::Status { network, node } => match node {
            Some(node) => print_json(&manager.get_node_status(&network, &node).await?)?,
            None => {
                let info = manager.get_network(&network)?;
                let mut statuses = Vec::with_capacity(info.config.nodes.len());
                for node in &info.config.nodes {
                    statuses.push(manager.get_node_status(&network, &node.id).await?);
                }
                print_json(&statuses)?;
            }
        },
        Command::WaitReady { network, node, .. } => {
            let cancel = ctrl_c_cancel();
            match node {
                Some(node) => print_json(&manager.wait_until_ready(&network, &node, cancel).await?)?,
                None => print_json(&manager.wait_until_network_ready(&network, cancel).await?)?,
            }
        }
        Command::List => print_json(&manager.list_networks()?)?,
        Command::Suggest { config } => {
            let config = config_loader::load_network_config(&config)?;
            print_json(&manager.suggest_alternatives(&config)?)?;
        }
        Command::Ping => {
            if !manager.docker().is_docker_available().await {
                return Err(eyre!("Docker daemon is not reachable"));
            }
            info!("Docker daemon is reachable");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    // Initialize logging with default filter level of "info"
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let mut settings = prepare_settings(&args)?;
    if let Command::WaitReady { timeout_secs: Some(secs), .. } = &args.command {
        settings.readiness.timeout = Duration::from_secs(*secs);
    }
    info!("Workspace: {:?}", settings.workspace_root);

    let store = Arc::new(FsStore::new(settings.networks_dir()));
    let runtime = Arc::new(BollardRuntime::connect_local().wrap_err("Failed to connect to Docker")?);
    let manager = NetworkManager::new(settings, runtime, store);

    run(&manager, args.command).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from(["besunet", "create", "--config", "net.yaml", "--wait"]);
        assert!(args.settings.is_none());
        match args.command {
            Command::Create { config, wait } => {
                assert_eq!(config, PathBuf::from("net.yaml"));
                assert!(wait);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_options_and_node_commands() {
        let args = Args::parse_from([
            "besunet",
            "--settings",
            "besunet.yaml",
            "remove-node",
            "--network",
            "devnet",
            "--node",
            "rpc-1",
        ]);
        assert_eq!(args.settings, Some(PathBuf::from("besunet.yaml")));
        match args.command {
            Command::RemoveNode { network, node } => {
                assert_eq!(network, "devnet");
                assert_eq!(node, "rpc-1");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_wait_ready_timeout() {
        let args = Args::parse_from(["besunet", "wait-ready", "-n", "devnet", "--timeout-secs", "30"]);
        match args.command {
            Command::WaitReady { network, node, timeout_secs } => {
                assert_eq!(network, "devnet");
                assert!(node.is_none());
                assert_eq!(timeout_secs, Some(30));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
