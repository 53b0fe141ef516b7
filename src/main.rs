use clap::Parser;
use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use env_logger::Env;
use log::info;
use std::path::PathBuf;
use std::time::Duration;

use transitmesh::config_loader;
use transitmesh::graph::ResourceId;
use transitmesh::orchestrator::{self, generate_plan_manifest, write_acceptance_report, write_outputs};
use transitmesh::peering::{AcceptancePolicy, AcceptanceTask, ApprovalError};

/// Planner for multi-region transit network topologies
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the topology configuration YAML file
    #[arg(short, long)]
    config: PathBuf,

    /// Output directory for the manifest and outputs
    #[arg(short, long, default_value = "plan_output")]
    output: PathBuf,

    /// Validate and plan without writing anything
    #[arg(long)]
    check: bool,

    /// Drive every peering link through acceptance against an always-approving endpoint
    #[arg(long, conflicts_with = "check")]
    simulate_acceptance: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of parallel acceptance workers (0 = auto-detect)
    #[arg(short = 'j', long, default_value = "0")]
    threads: usize,
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse command-line arguments
    let args = Args::parse();

    // Initialize logging, RUST_LOG overrides --log-level
    env_logger::Builder::from_env(Env::default().default_filter_or(&args.log_level)).init();

    // Size the pool used for parallel acceptance
    if args.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()
            .wrap_err("Failed to configure thread pool")?;
    }

    info!("Starting transitmesh planner");
    info!("Configuration file: {:?}", args.config);

    // Load and validate configuration
    let config = config_loader::load_config(&args.config)?;

    // Plan only, nothing is written
    if args.check {
        let plan = orchestrator::plan_topology(&config)
            .wrap_err_with(|| format!("Topology '{}' does not plan", config.general.name))?;
        info!(
            "Configuration is valid: {} resource(s), {} peering link(s)",
            plan.graph().len(),
            plan.links().len()
        );
        return Ok(());
    }

    info!("Output directory: {:?}", args.output);
    // Plan and write manifest.yaml and outputs.json
    let mut plan = generate_plan_manifest(&config, &args.output)?;

    // Accept every link against an endpoint that always approves
    if args.simulate_acceptance {
        let policy = AcceptancePolicy {
            backoff: Duration::ZERO,
            ..*plan.policy()
        };
        let approve = |_: &ResourceId, _: &str| -> Result<(), ApprovalError> { Ok(()) };
        let summary = plan.accept_peering_links(&AcceptanceTask::new(policy, approve));

        let report_path = write_acceptance_report(&summary, &args.output)?;
        write_outputs(&plan, &args.output)?;
        info!("Acceptance report written to {:?}", report_path);

        if !summary.all_accepted() {
            bail!("{} of {} peering link(s) failed acceptance", summary.failed, summary.reports.len());
        }
    }

    info!("Planning completed successfully");
    Ok(())
}
