//! In-memory node store for tests and local-only editing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

use inkspace_core::{ActorProfile, DocumentNode, NodeKind, NodePatch};

use super::{check_id, NodeStore, StoreError};

/// HashMap-backed [`NodeStore`].
///
/// The write counter lets tests assert batching behavior (one debounced
/// persist per quiet window) without instrumenting the scheduler.
#[derive(Default)]
pub struct MemoryStore {
    nodes: RwLock<HashMap<Uuid, DocumentNode>>,
    profiles: RwLock<HashMap<String, ActorProfile>>,
    writes: AtomicU64,
    /// When set, every write fails with `Persistence` (failure-path tests).
    fail_writes: std::sync::atomic::AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of node writes (create + update + delete) performed.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Make subsequent writes fail (simulated backend outage).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.read().map(|n| n.len()).unwrap_or(0)
    }

    fn guard_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Persistence("write failure injected".into()));
        }
        Ok(())
    }

    /// Collect `id` plus every transitive descendant.
    fn descendants(nodes: &HashMap<Uuid, DocumentNode>, id: Uuid) -> Vec<Uuid> {
        let mut stack = vec![id];
        let mut found = Vec::new();
        while let Some(current) = stack.pop() {
            found.push(current);
            for node in nodes.values() {
                if node.parent_id == Some(current) {
                    stack.push(node.id);
                }
            }
        }
        found
    }
}

impl NodeStore for MemoryStore {
    fn get_node(&self, kind: NodeKind, id: Uuid) -> Result<DocumentNode, StoreError> {
        check_id(id)?;
        let nodes = self
            .nodes
            .read()
            .map_err(|e| StoreError::Persistence(e.to_string()))?;
        match nodes.get(&id) {
            Some(node) if node.kind == kind => Ok(node.clone()),
            _ => Err(StoreError::NotFound(format!("{kind} {id}"))),
        }
    }

    fn create_node(&self, node: &DocumentNode) -> Result<(), StoreError> {
        check_id(node.id)?;
        node.validate()
            .map_err(|e| StoreError::Constraint(e.to_string()))?;
        self.guard_writable()?;

        let mut nodes = self
            .nodes
            .write()
            .map_err(|e| StoreError::Persistence(e.to_string()))?;

        if nodes.contains_key(&node.id) {
            return Err(StoreError::Constraint(format!("duplicate id {}", node.id)));
        }
        if let Some(parent_id) = node.parent_id {
            let parent = nodes
                .get(&parent_id)
                .ok_or_else(|| StoreError::Constraint(format!("missing parent {parent_id}")))?;
            if Some(parent.kind) != node.kind.parent_kind() {
                return Err(StoreError::Constraint(format!(
                    "{} cannot own {}",
                    parent.kind, node.kind
                )));
            }
        }

        nodes.insert(node.id, node.clone());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn update_node(&self, patch: &NodePatch, id: Uuid) -> Result<DocumentNode, StoreError> {
        check_id(id)?;
        self.guard_writable()?;

        let mut nodes = self
            .nodes
            .write()
            .map_err(|e| StoreError::Persistence(e.to_string()))?;
        let node = nodes
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("node {id}")))?;

        patch.apply_to(node);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(node.clone())
    }

    fn delete_node(&self, id: Uuid) -> Result<(), StoreError> {
        check_id(id)?;
        self.guard_writable()?;

        let mut nodes = self
            .nodes
            .write()
            .map_err(|e| StoreError::Persistence(e.to_string()))?;
        if !nodes.contains_key(&id) {
            return Err(StoreError::NotFound(format!("node {id}")));
        }

        for victim in Self::descendants(&nodes, id) {
            nodes.remove(&victim);
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn list_children(&self, parent_id: Uuid) -> Result<Vec<DocumentNode>, StoreError> {
        check_id(parent_id)?;
        let nodes = self
            .nodes
            .read()
            .map_err(|e| StoreError::Persistence(e.to_string()))?;

        let mut children: Vec<DocumentNode> = nodes
            .values()
            .filter(|n| n.parent_id == Some(parent_id))
            .cloned()
            .collect();
        children.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(children)
    }

    fn actor_profile(&self, actor_id: &str) -> Result<ActorProfile, StoreError> {
        let profiles = self
            .profiles
            .read()
            .map_err(|e| StoreError::Persistence(e.to_string()))?;
        profiles
            .get(actor_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("profile {actor_id}")))
    }

    fn put_actor_profile(&self, profile: &ActorProfile) -> Result<(), StoreError> {
        let mut profiles = self
            .profiles
            .write()
            .map_err(|e| StoreError::Persistence(e.to_string()))?;
        profiles.insert(profile.actor_id.clone(), profile.clone());
        Ok(())
    }
}
