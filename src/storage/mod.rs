pub mod db;
pub mod locks;
pub mod models;
mod nodes;
mod pools;
mod sessions;
mod tables;
mod tokens;

pub use db::{Database, DatabaseError, PurgeStats};
pub use locks::{EntityLockGuard, EntityLocks};
pub use tables::*;
