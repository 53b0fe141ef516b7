//! Resource graph builder.
//!
//! Components add their resources to a [`GraphBuilder`] while the plan is
//! being computed. Nothing outside the planner ever sees the builder: the
//! provisioning boundary only receives the immutable [`ResourceGraph`]
//! returned by [`GraphBuilder::build`].

use super::types::{Dependency, Resource, ResourceId, ResourceKind, ResourceNode};
use crate::error::PlanError;
use std::collections::{HashMap, HashSet};

/// Mutable graph under construction
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<ResourceNode>,
    index: HashMap<ResourceId, usize>,
    edges: Vec<(usize, usize)>,
    edge_set: HashSet<(usize, usize)>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource, ordering it after every resource it references
    ///
    /// Fails with `DanglingReference` when a referenced resource has not been
    /// added yet and with `DuplicateResource` when `id` is already taken.
    pub fn add(&mut self, region: &str, id: ResourceId, resource: Resource) -> Result<ResourceId, PlanError> {
        self.add_after(region, id, resource, &[])
    }

    /// Add a resource with extra ordering constraints beyond its references
    pub fn add_after(
        &mut self,
        region: &str,
        id: ResourceId,
        resource: Resource,
        after: &[&ResourceId],
    ) -> Result<ResourceId, PlanError> {
        if self.index.contains_key(&id) {
            return Err(PlanError::DuplicateResource { id: id.to_string() });
        }

        let mut before = Vec::new();
        for reference in resource.references().into_iter().chain(after.iter().copied()) {
            match self.index.get(reference) {
                Some(&position) => before.push(position),
                None => {
                    return Err(PlanError::DanglingReference {
                        component: id.to_string(),
                        reference: reference.to_string(),
                        reason: "referenced resource has not been planned".to_string(),
                    })
                }
            }
        }

        log::debug!("Planned {:?} {}", resource.kind(), id);
        let position = self.nodes.len();
        self.index.insert(id.clone(), position);
        self.nodes.push(ResourceNode {
            id: id.clone(),
            region: region.to_string(),
            resource,
        });
        for source in before {
            self.link(source, position);
        }
        Ok(id)
    }

    fn link(&mut self, before: usize, after: usize) {
        if before != after && self.edge_set.insert((before, after)) {
            self.edges.push((before, after));
        }
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.index.get(id).map(|&position| &self.nodes[position].resource)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Freeze the graph into a snapshot
    ///
    /// A resource can only reference resources added before it, so insertion
    /// order is already a valid creation order and the graph has no cycles.
    pub fn build(self) -> ResourceGraph {
        let mut edges = self.edges;
        edges.sort_unstable_by_key(|&(before, after)| (after, before));
        let edges = edges
            .into_iter()
            .map(|(before, after)| Dependency {
                before: self.nodes[before].id.clone(),
                after: self.nodes[after].id.clone(),
            })
            .collect();

        ResourceGraph {
            nodes: self.nodes,
            edges,
            index: self.index,
        }
    }
}

/// Immutable, validated resource graph
///
/// Nodes are stored in a valid creation order: every dependency edge points
/// from an earlier node to a later one.
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    nodes: Vec<ResourceNode>,
    edges: Vec<Dependency>,
    index: HashMap<ResourceId, usize>,
}

impl ResourceGraph {
    /// Nodes in creation order
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Dependency] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &ResourceId) -> Option<&ResourceNode> {
        self.index.get(id).map(|&position| &self.nodes[position])
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    /// Position of a resource in the creation order
    pub fn position(&self, id: &ResourceId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Resources that must exist before `id`
    pub fn dependencies_of(&self, id: &ResourceId) -> Vec<&ResourceId> {
        self.edges
            .iter()
            .filter(|edge| &edge.after == id)
            .map(|edge| &edge.before)
            .collect()
    }

    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter().filter(move |node| node.resource.kind() == kind)
    }

    pub fn count(&self, kind: ResourceKind) -> usize {
        self.of_kind(kind).count()
    }

    /// Number of resources of each kind, for logging
    pub fn kind_counts(&self) -> Vec<(ResourceKind, usize)> {
        let mut counts: Vec<(ResourceKind, usize)> = Vec::new();
        for node in &self.nodes {
            let kind = node.resource.kind();
            match counts.iter_mut().find(|(k, _)| *k == kind) {
                Some((_, count)) => *count += 1,
                None => counts.push((kind, 1)),
            }
        }
        counts
    }
}
