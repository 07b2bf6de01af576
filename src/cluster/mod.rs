//! Cluster membership as seen by status index allocation: every running
//! instance is identified by a stable integer that owns the pools it creates.

mod node;

pub use node::{ClusterError, ClusterNode, ClusterNodeManager};
