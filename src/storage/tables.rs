use redb::TableDefinition;

/// Sessions: session_id -> SessionRecord (msgpack)
pub const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

/// Session expiration index: "{expires_ms:020}:{session_id}" -> session_id
pub const SESSION_EXPIRY: TableDefinition<&str, &str> = TableDefinition::new("session_expiry");

/// Access tokens: jti -> TokenRecord (msgpack)
pub const TOKENS: TableDefinition<&str, &[u8]> = TableDefinition::new("tokens");

/// Token expiration index: "{expires_ms:020}:{jti}" -> jti
pub const TOKEN_EXPIRY: TableDefinition<&str, &str> = TableDefinition::new("token_expiry");

/// Secondary index: session_id -> Vec<jti> (tokens issued within a session)
pub const SESSION_TOKENS: TableDefinition<&str, &[u8]> = TableDefinition::new("session_tokens");

/// Token status pools: pool_id -> StatusIndexPool (msgpack)
pub const TOKEN_STATUS_POOLS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("token_status_pools");

/// Session status pools: pool_id -> StatusIndexPool (msgpack)
pub const SESSION_STATUS_POOLS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("session_status_pools");

/// Monotonic counters: name -> next value
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// Cluster node registry: node name -> integer node id
pub const CLUSTER_NODES: TableDefinition<&str, u32> = TableDefinition::new("cluster_nodes");
