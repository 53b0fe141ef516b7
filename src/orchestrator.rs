//! Topology orchestrator.
//!
//! This module coordinates the planning run, from a validated configuration
//! through networks, hubs, peering links and remote access links, to the
//! manifest and outputs written for the provisioning engine.

use crate::config::{RegionConfig, TopologyConfig};
use crate::error::PlanError;
use crate::graph::{GraphBuilder, ResourceGraph, ResourceId};
use crate::hub::{RemotePrefix, RoutingHub};
use crate::ip::{parse_block, AddressRegistry};
use crate::manifest::{AcceptanceSummary, Manifest, PeeringOutputs, PlanOutputs};
use crate::network::NetworkBlueprint;
use crate::peering::{
    AcceptancePolicy, AcceptanceReport, AcceptanceTask, Approver, LifecycleEvent, PeeringLink, Sleeper,
};
use crate::remote_access::{OnPremPeer, RemoteAccessLink};
use color_eyre::eyre::WrapErr;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.yaml";
pub const OUTPUTS_FILE: &str = "outputs.json";
pub const ACCEPTANCE_FILE: &str = "acceptance.json";

/// Result of one planning run
///
/// The resource graph is frozen; only peering link states move afterwards,
/// driven by [`Plan::accept_peering_links`].
#[derive(Debug)]
pub struct Plan {
    name: String,
    regions: Vec<String>,
    graph: ResourceGraph,
    networks: Vec<NetworkBlueprint>,
    hubs: Vec<RoutingHub>,
    links: Vec<PeeringLink>,
    remote_access: Vec<RemoteAccessLink>,
    policy: AcceptancePolicy,
}

impl Plan {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    pub fn networks(&self) -> &[NetworkBlueprint] {
        &self.networks
    }

    pub fn hubs(&self) -> &[RoutingHub] {
        &self.hubs
    }

    pub fn links(&self) -> &[PeeringLink] {
        &self.links
    }

    pub fn remote_access(&self) -> &[RemoteAccessLink] {
        &self.remote_access
    }

    pub fn policy(&self) -> &AcceptancePolicy {
        &self.policy
    }

    pub fn network(&self, region: &str) -> Option<&NetworkBlueprint> {
        self.networks.iter().find(|network| network.region() == region)
    }

    pub fn hub(&self, region: &str) -> Option<&RoutingHub> {
        self.hubs.iter().find(|hub| hub.region() == region)
    }

    pub fn link(&self, id: &ResourceId) -> Option<&PeeringLink> {
        self.links.iter().find(|link| link.id() == id)
    }

    pub fn manifest(&self) -> Manifest {
        Manifest::from_graph(&self.name, self.regions.clone(), &self.graph)
    }

    pub fn outputs(&self) -> PlanOutputs {
        PlanOutputs {
            networks: self
                .networks
                .iter()
                .map(|network| (network.region().to_string(), network.outputs()))
                .collect(),
            hubs: self
                .hubs
                .iter()
                .map(|hub| (hub.region().to_string(), hub.outputs()))
                .collect(),
            peering_links: self
                .links
                .iter()
                .map(|link| PeeringOutputs {
                    link_id: link.id().clone(),
                    requester_region: link.requester_region().to_string(),
                    accepter_region: link.accepter_region().to_string(),
                    requester_hub: link.requester_hub().clone(),
                    accepter_hub: link.accepter_hub().clone(),
                    state: link.state(),
                })
                .collect(),
            remote_access: self.remote_access.iter().map(|access| access.outputs()).collect(),
        }
    }

    /// Drive every pending link through the acceptance task
    ///
    /// Links are independent, so they are accepted in parallel. A failed link
    /// is reported in the summary and never affects its siblings.
    pub fn accept_peering_links<A, S>(&mut self, task: &AcceptanceTask<A, S>) -> AcceptanceSummary
    where
        A: Approver + Sync,
        S: Sleeper + Sync,
    {
        info!("Accepting {} peering link(s)", self.links.len());
        let reports: Vec<AcceptanceReport> = self
            .links
            .par_iter_mut()
            .filter(|link| !link.state().is_terminal())
            .map(|link| {
                let report = task.run(&link.acceptance_request(LifecycleEvent::Create));
                if let Err(err) = link.record(&report) {
                    warn!("{}: could not record acceptance outcome: {}", link.id(), err);
                }
                report
            })
            .collect();

        let summary = AcceptanceSummary::from_reports(reports);
        if summary.all_accepted() {
            info!("All {} peering link(s) accepted", summary.accepted);
        } else {
            for err in self.links.iter().filter_map(|link| link.failure()) {
                warn!("{}", err);
            }
        }
        summary
    }
}

/// Builds one plan from a configuration
pub struct TopologyPlanner<'a> {
    config: &'a TopologyConfig,
    graph: GraphBuilder,
    registry: AddressRegistry,
}

impl<'a> TopologyPlanner<'a> {
    pub fn new(config: &'a TopologyConfig) -> Self {
        Self {
            config,
            graph: GraphBuilder::new(),
            registry: AddressRegistry::new(),
        }
    }

    /// Materialize networks, then hubs, then peering links, then remote access
    ///
    /// Any error aborts the whole plan; no partial graph is returned.
    pub fn plan(mut self) -> Result<Plan, PlanError> {
        let config = self.config;
        config.validate()?;

        let transit = config.transit_regions();
        info!(
            "Planning topology '{}' across {} region(s), {} with transit",
            config.general.name,
            config.regions.len(),
            transit.len()
        );

        let mut networks = Vec::with_capacity(config.regions.len());
        for region in &config.regions {
            let network = NetworkBlueprint::create(
                &mut self.graph,
                &mut self.registry,
                region,
                transit.contains(&region.name),
            )?;
            networks.push(network);
        }

        let mut hubs = Vec::new();
        for (region, network) in config.regions.iter().zip(&networks) {
            if !transit.contains(&region.name) {
                debug!("{}: no peering or remote access, skipping hub", region.name);
                continue;
            }
            let mut hub = RoutingHub::create(
                &mut self.graph,
                &region.name,
                hub_asn(config, region),
                config.general.multicast,
            )?;
            hub.attach(&mut self.graph, network)?;
            hubs.push(hub);
        }

        let mut links = Vec::new();
        for pair in config.peering.pairs(&config.regions) {
            let link_name = format!("{}/peering/{}", pair.requester, pair.accepter);
            let requester = hub_position(&hubs, &pair.requester, &link_name)?;
            let accepter = hub_position(&hubs, &pair.accepter, &link_name)?;

            let link = PeeringLink::request(
                &mut self.graph,
                &hubs[requester],
                &hubs[accepter],
                config.general.account_id.as_deref(),
                &config.acceptance,
            )?;
            exchange_prefixes(&mut hubs, requester, accepter, &link);
            links.push(link);
        }

        let mut routes = 0;
        for hub in &hubs {
            for prefix in hub.remote_prefixes() {
                debug!("{}: learned {} from {} via {}", hub.id(), prefix.cidr, prefix.region, prefix.via);
            }
            routes += hub.propagate_routes(&mut self.graph)?;
        }
        info!("Propagated {} route(s) across {} hub(s)", routes, hubs.len());

        let mut remote_access = Vec::new();
        for access in &config.remote_access {
            let component = format!("{}/remote-access", access.region);
            let routed_cidr = parse_block(&component, &access.routed_cidr)?;
            let network = networks
                .iter()
                .find(|network| network.region() == access.region)
                .ok_or_else(|| PlanError::IncompleteTopology {
                    component: component.clone(),
                    missing: format!("{}/network", access.region),
                })?;
            let hub = hubs
                .iter()
                .find(|hub| hub.region() == access.region)
                .ok_or_else(|| PlanError::IncompleteTopology {
                    component: component.clone(),
                    missing: format!("{}/hub", access.region),
                })?;

            let link = RemoteAccessLink::create(
                &mut self.graph,
                &self.registry,
                &OnPremPeer::from(access),
                routed_cidr,
                hub.id(),
                network,
            )?;
            remote_access.push(link);
        }

        let graph = self.graph.build();
        info!(
            "Planned {} resource(s) with {} dependency edge(s)",
            graph.len(),
            graph.edges().len()
        );
        for (kind, count) in graph.kind_counts() {
            debug!("  - {:?}: {}", kind, count);
        }

        Ok(Plan {
            name: config.general.name.clone(),
            regions: config.regions.iter().map(|region| region.name.clone()).collect(),
            graph,
            networks,
            hubs,
            links,
            remote_access,
            policy: config.acceptance,
        })
    }
}

fn hub_asn(config: &TopologyConfig, region: &RegionConfig) -> u32 {
    region.hub_asn.unwrap_or(config.general.hub_asn)
}

fn hub_position(hubs: &[RoutingHub], region: &str, link: &str) -> Result<usize, PlanError> {
    hubs.iter()
        .position(|hub| hub.region() == region)
        .ok_or_else(|| PlanError::IncompleteTopology {
            component: link.to_string(),
            missing: format!("{}/hub", region),
        })
}

/// Teach each side of `link` the networks attached on the other side
fn exchange_prefixes(hubs: &mut [RoutingHub], requester: usize, accepter: usize, link: &PeeringLink) {
    let sides = [(requester, accepter), (accepter, requester)];
    for (local, remote) in sides {
        let region = hubs[remote].region().to_string();
        for cidr in hubs[remote].attached_cidrs() {
            hubs[local].learn_remote_prefix(RemotePrefix {
                cidr,
                region: region.clone(),
                via: link.id().clone(),
                after: link.acceptance().clone(),
            });
        }
    }
}

/// Plan `config` in one call
pub fn plan_topology(config: &TopologyConfig) -> Result<Plan, PlanError> {
    TopologyPlanner::new(config).plan()
}

/// Plan `config` and write the manifest and outputs into `output_dir`
pub fn generate_plan_manifest(config: &TopologyConfig, output_dir: &Path) -> color_eyre::Result<Plan> {
    let plan = plan_topology(config).wrap_err_with(|| format!("Failed to plan topology '{}'", config.general.name))?;

    fs::create_dir_all(output_dir)
        .wrap_err_with(|| format!("Failed to create output directory '{}'", output_dir.display()))?;

    let manifest_path = output_dir.join(MANIFEST_FILE);
    let manifest_yaml = serde_yaml::to_string(&plan.manifest())?;
    fs::write(&manifest_path, manifest_yaml)
        .wrap_err_with(|| format!("Failed to write manifest '{}'", manifest_path.display()))?;

    let outputs_path = write_outputs(&plan, output_dir)?;

    info!("Generated manifest at {:?}", manifest_path);
    info!("  - Resources: {}", plan.graph().len());
    info!("  - Dependencies: {}", plan.graph().edges().len());
    info!("  - Peering links: {}", plan.links().len());
    info!("  - Remote access links: {}", plan.remote_access().len());
    info!("  - Outputs: {:?}", outputs_path);

    Ok(plan)
}

/// Write the declared outputs, reflecting current link states
pub fn write_outputs(plan: &Plan, output_dir: &Path) -> color_eyre::Result<PathBuf> {
    let path = output_dir.join(OUTPUTS_FILE);
    let json = serde_json::to_string_pretty(&plan.outputs())?;
    fs::write(&path, json).wrap_err_with(|| format!("Failed to write outputs '{}'", path.display()))?;
    Ok(path)
}

pub fn write_acceptance_report(summary: &AcceptanceSummary, output_dir: &Path) -> color_eyre::Result<PathBuf> {
    let path = output_dir.join(ACCEPTANCE_FILE);
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(&path, json).wrap_err_with(|| format!("Failed to write acceptance report '{}'", path.display()))?;
    Ok(path)
}
