use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use env_logger::Env;
use log::info;
use std::path::{Path, PathBuf};

use nodealloc::config::Config;
use nodealloc::config_loader::{load_config, write_report};
use nodealloc::error::AllocationError;
use nodealloc::model::{AllocationId, NodeId, ServerId};
use nodealloc::orchestrator::{self, DeploymentOutcome, PoolStats};
use nodealloc::selector::{AllocationSelector, SelectionFilter};
use nodealloc::store::{AllocationStore, MemoryStore};

/// Provision node allocations and place servers on them
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Pool snapshot carried between invocations
    #[arg(short, long, global = true, default_value = "allocations.snapshot")]
    state: PathBuf,

    /// Log level filter (overridden by RUST_LOG; default: the plan's
    /// `general.log_level`, then "info")
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply a YAML provisioning plan to the pool
    Provision {
        /// Path to the plan YAML file
        #[arg(short, long)]
        config: PathBuf,

        /// Write the JSON report here instead of stdout
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Start from an empty pool even if a snapshot exists
        #[arg(long)]
        fresh: bool,
    },

    /// Claim one free allocation for a server
    Deploy {
        #[arg(long)]
        server: u64,

        /// Require the whole IP to be free of other servers
        #[arg(long)]
        dedicated: bool,

        /// Restrict to these nodes (repeatable)
        #[arg(long = "node")]
        nodes: Vec<u32>,

        /// Restrict to these ports or ranges, e.g. 25565 or 25565-25600 (repeatable)
        #[arg(long = "port")]
        ports: Vec<String>,

        /// Seed for the random pick
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Return a server's allocations to the pool
    Release {
        #[arg(long)]
        server: u64,

        /// Only release this allocation
        #[arg(long)]
        allocation: Option<u64>,
    },

    /// Print allocations as JSON
    List {
        #[arg(long)]
        node: Option<u32>,

        /// Only show unassigned allocations
        #[arg(long)]
        free: bool,
    },
}

/// `general.log_level` of the plan at `path`, if it can be read.
///
/// Runs before the logger exists, so a broken plan is left for
/// `load_config` to report.
fn plan_log_level(path: &Path) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    serde_yaml::from_str::<Config>(&text).ok()?.general.log_level
}

fn log_filter(args: &Args) -> String {
    let from_plan = match &args.command {
        Command::Provision { config, .. } => plan_log_level(config),
        _ => None,
    };
    args.log_level
        .clone()
        .or(from_plan)
        .unwrap_or_else(|| "info".to_string())
}

fn open_store(path: &Path, seed: Option<u64>) -> Result<MemoryStore> {
    if !path.exists() {
        bail!("No allocation pool at '{}'; run `provision` first", path.display());
    }
    MemoryStore::load_snapshot(path, seed)
        .wrap_err_with(|| format!("Failed to load allocation pool '{}'", path.display()))
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or(log_filter(&args))).init();

    match args.command {
        Command::Provision { config, report, fresh } => {
            let config = load_config(&config)?;
            let store = if args.state.exists() && !fresh {
                let store = open_store(&args.state, config.general.seed)?;
                match config.general.op_timeout {
                    Some(timeout) => store.with_op_timeout(timeout),
                    None => store,
                }
            } else {
                orchestrator::build_store(&config)
            };

            let plan_report = orchestrator::run_plan(&store, &config)?;
            store.save_snapshot(&args.state)?;
            write_report(&plan_report, report.as_deref())?;
        }

        Command::Deploy { server, dedicated, nodes, ports, seed } => {
            let store = open_store(&args.state, seed)?;
            let filter = SelectionFilter::builder()
                .dedicated(dedicated)
                .nodes(nodes.into_iter().map(NodeId))
                .ports(&ports)?
                .build();

            let outcome = match AllocationSelector::new(&store).select(&filter, ServerId(server)) {
                Ok(allocation) => {
                    info!("Server {} placed on {}", server, allocation.display_address());
                    DeploymentOutcome::Assigned { server: ServerId(server), allocation }
                }
                Err(AllocationError::NoViableAllocation) => DeploymentOutcome::Exhausted { server: ServerId(server) },
                Err(e) => return Err(e.into()),
            };

            store.save_snapshot(&args.state)?;
            write_report(&outcome, None)?;
        }

        Command::Release { server, allocation } => {
            let store = open_store(&args.state, None)?;
            let released = match allocation {
                Some(id) => {
                    AllocationSelector::new(&store).release(AllocationId(id), ServerId(server))?;
                    1
                }
                None => orchestrator::release_server(&store, ServerId(server))?,
            };

            store.save_snapshot(&args.state)?;
            info!("Released {} allocations", released);
        }

        Command::List { node, free } => {
            let store = open_store(&args.state, None)?;
            let allocations: Vec<_> = store
                .allocations(node.map(NodeId))?
                .into_iter()
                .filter(|allocation| !free || !allocation.is_assigned())
                .collect();

            let stats = PoolStats::from_allocations(&allocations);
            info!("{} allocations ({} assigned, {} free)", stats.total, stats.assigned, stats.free);
            write_report(&allocations, None)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from(["nodealloc", "provision", "--config", "plan.yaml"]);

        assert_eq!(args.state, PathBuf::from("allocations.snapshot"));
        match args.command {
            Command::Provision { config, report, fresh } => {
                assert_eq!(config, PathBuf::from("plan.yaml"));
                assert!(report.is_none());
                assert!(!fresh);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_deploy_args() {
        let args = Args::parse_from([
            "nodealloc",
            "--state",
            "pool.bin",
            "deploy",
            "--server",
            "12",
            "--dedicated",
            "--node",
            "1",
            "--node",
            "2",
            "--port",
            "25565-25600",
        ]);

        assert_eq!(args.state, PathBuf::from("pool.bin"));
        match args.command {
            Command::Deploy { server, dedicated, nodes, ports, seed } => {
                assert_eq!(server, 12);
                assert!(dedicated);
                assert_eq!(nodes, vec![1, 2]);
                assert_eq!(ports, vec!["25565-25600".to_string()]);
                assert!(seed.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_log_filter_precedence() {
        let dir = tempfile::TempDir::new().unwrap();
        let plan = dir.path().join("plan.yaml");
        std::fs::write(&plan, "general:\n  log_level: debug\nnodes: []\n").unwrap();
        let plan = plan.to_str().unwrap();

        let args = Args::parse_from(["nodealloc", "provision", "--config", plan]);
        assert_eq!(log_filter(&args), "debug");

        let args = Args::parse_from(["nodealloc", "--log-level", "warn", "provision", "--config", plan]);
        assert_eq!(log_filter(&args), "warn");

        let args = Args::parse_from(["nodealloc", "list"]);
        assert_eq!(log_filter(&args), "info");

        let args = Args::parse_from(["nodealloc", "provision", "--config", "/nonexistent/plan.yaml"]);
        assert_eq!(log_filter(&args), "info");
    }

    #[test]
    fn test_open_store_requires_snapshot() {
        assert!(open_store(Path::new("/nonexistent/pool.snapshot"), None).is_err());
    }
}
