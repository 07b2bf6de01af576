use thiserror::Error;

use crate::storage::{Database, DatabaseError};

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Identity of the running server instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNode {
    id: u32,
    name: String,
}

impl ClusterNode {
    /// Stable integer identifying this process in the cluster.
    pub fn node_id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Maps configured node names to stable integer ids.
pub struct ClusterNodeManager;

impl ClusterNodeManager {
    /// Look up `name` in the node registry, assigning the next free id on
    /// first registration. The same name always maps to the same id.
    pub fn register(db: &Database, name: &str) -> Result<ClusterNode, ClusterError> {
        let (id, created) = db.assign_node_id(name)?;
        if created {
            tracing::info!(node = %name, node_id = id, "Registered cluster node");
        } else {
            tracing::debug!(node = %name, node_id = id, "Reusing cluster node id");
        }

        Ok(ClusterNode {
            id,
            name: name.to_string(),
        })
    }
}
