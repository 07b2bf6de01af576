use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::tables::*;

const NODE_SEQUENCE_KEY: &str = "cluster_node";

impl Database {
    // ========================================================================
    // Cluster node registry
    // ========================================================================

    /// Return the id registered for `name`, assigning the next one if absent.
    pub fn assign_node_id(&self, name: &str) -> Result<(u32, bool), DatabaseError> {
        let write_txn = self.begin_write()?;
        let assigned = {
            let mut nodes = write_txn.open_table(CLUSTER_NODES)?;
            let existing = nodes.get(name)?.map(|v| v.value());

            match existing {
                Some(id) => (id, false),
                None => {
                    let mut sequences = write_txn.open_table(SEQUENCES)?;
                    let next = sequences
                        .get(NODE_SEQUENCE_KEY)?
                        .map(|v| v.value())
                        .unwrap_or(0);
                    let id = u32::try_from(next)
                        .map_err(|_| DatabaseError::SequenceExhausted(NODE_SEQUENCE_KEY))?;
                    nodes.insert(name, id)?;
                    sequences.insert(NODE_SEQUENCE_KEY, next + 1)?;
                    (id, true)
                }
            }
        };
        write_txn.commit()?;
        Ok(assigned)
    }
}
