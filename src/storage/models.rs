use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::bits::StatusBits;

/// Device kind detected from User-Agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DeviceKind {
    Bot,
    Desktop,
    Mobile,
    Tablet,
    #[default]
    Unknown,
}

/// Information about the device that created a session
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeviceInfo {
    pub browser: Option<String>,
    pub browser_version: Option<String>,
    pub kind: DeviceKind,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub raw_user_agent: String,
}

/// An authenticated session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub created_at: DateTime<Utc>,
    pub device_info: DeviceInfo,
    pub expires_at: DateTime<Utc>,
    /// Non-secret UUID identifier (used for lookups and revocation)
    pub id: String,
    /// Index in the session status list, assigned once on first issuance
    #[serde(default)]
    pub status_list_index: Option<i64>,
    pub subject_id: String,
    /// Opaque secret handed to the client (32-byte hex)
    pub token: String,
}

/// An issued access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// The `jti` claim
    pub id: String,
    pub scopes: Vec<String>,
    /// Session the token was issued within, if any
    pub session_id: Option<String>,
    /// Index in the token status list
    #[serde(default)]
    pub status_list_index: Option<i64>,
    pub subject_id: String,
}

/// A contiguous block of the global status index space.
///
/// Global index of entry `offset` is `id * block_size + offset`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusIndexPool {
    pub bits: StatusBits,
    pub block_size: u32,
    pub created_at: DateTime<Utc>,
    /// Offsets handed out as of the owner's last checkpoint, or -1 once the
    /// owning node has exhausted the pool
    pub cursor: i64,
    /// Block number
    pub id: u64,
    /// Cluster node that allocated this pool
    pub owner_node_id: u32,
    pub updated_at: DateTime<Utc>,
}

impl StatusIndexPool {
    pub fn new(id: u64, owner_node_id: u32, block_size: u32, bit_size: u8) -> Self {
        let now = Utc::now();
        Self {
            bits: StatusBits::new(bit_size, u64::from(block_size)),
            block_size,
            created_at: now,
            cursor: 0,
            id,
            owner_node_id,
            updated_at: now,
        }
    }

    /// First global index covered by this pool.
    pub fn start_index(&self) -> u64 {
        self.id * u64::from(self.block_size)
    }

    pub fn contains(&self, global_index: u64) -> bool {
        global_index / u64::from(self.block_size) == self.id
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor < 0
    }
}
