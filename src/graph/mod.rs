//! Resource graph module.
//!
//! A plan is a directed acyclic graph: nodes are typed resource descriptors,
//! edges are "must exist before" constraints. The provisioning engine may
//! submit a node only once every node with an edge into it exists.

pub mod builder;
pub mod types;

pub use builder::{GraphBuilder, ResourceGraph};
pub use types::{
    Dependency, IngressRule, Protocol, Resource, ResourceId, ResourceKind, ResourceNode, RouteTarget,
};
