//! # transitmesh - Planner for multi-region transit network topologies
//!
//! This library turns a declarative description of regional networks into a
//! resource graph that an external provisioning engine can apply.
//!
//! ## Overview
//!
//! Each region gets an isolated network with public and private subnets. The
//! networks are joined through per-region routing hubs, hubs are joined by
//! peering links across regions, and an optional site-to-site VPN attaches an
//! on-premises network to one region. The planner never talks to a provider:
//! it emits typed resource descriptors and "must exist before" edges.
//!
//! ## Key Features
//!
//! - **Address safety**: overlapping network blocks are rejected before anything is planned
//! - **Deterministic plans**: identical configurations yield identical graphs
//! - **Cross-region routing**: every subnet reaches every peered network through its hub
//! - **Peering acceptance**: retried, out-of-band acceptance with an explicit state machine
//! - **Remote access**: static-route VPN into a region's network and hub
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - `config`: Type-safe configuration structures and validation
//! - `config_loader`: Configuration file loading
//! - `graph`: Resource descriptors, identifiers and the graph builder
//! - `ip`: CIDR parsing, subnet carving and the address registry
//! - `network`: Per-region network blueprints
//! - `hub`: Routing hubs and route propagation
//! - `peering`: Peering links and the acceptance task
//! - `remote_access`: On-premises VPN links
//! - `manifest`: Manifest and output documents
//! - `orchestrator`: The topology planner and file generation
//! - `utils`: Validation helpers
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use transitmesh::{config_loader, orchestrator};
//!
//! let config = config_loader::load_config(Path::new("topology.yaml"))?;
//!
//! // Writes manifest.yaml and outputs.json
//! let plan = orchestrator::generate_plan_manifest(&config, Path::new("plan_output"))?;
//! println!("{} resources", plan.graph().len());
//! # Ok::<(), color_eyre::eyre::Error>(())
//! ```
//!
//! ## Configuration Format
//!
//! ```yaml
//! general:
//!   name: capstone
//!   hub_asn: 64512
//!
//! regions:
//!   - name: us-east-1
//!     address_block: 172.16.0.0/16
//!     primary: true
//!   - name: eu-west-1
//!     address_block: 172.17.0.0/16
//!
//! peering:
//!   topology: full_mesh
//!
//! remote_access:
//!   - region: us-east-1
//!     routed_cidr: 10.0.0.0/8
//! ```
//!
//! ## Error Handling
//!
//! Planning errors are [`error::PlanError`] values and abort the whole plan.
//! Acceptance failures are [`error::AcceptanceError`] values reported per
//! link. File-level entry points return `color_eyre::Result`.

pub mod config;
pub mod config_loader;
pub mod error;
pub mod graph;
pub mod hub;
pub mod ip;
pub mod manifest;
pub mod network;
pub mod orchestrator;
pub mod peering;
pub mod remote_access;
pub mod utils;

pub use error::{AcceptanceError, PlanError};
pub use orchestrator::{plan_topology, Plan, TopologyPlanner};
