mod admin;
mod sessions;
mod status_list;
mod tokens;

pub use admin::{admin_purge, discovery, health};
pub use sessions::{create_session, get_session, revoke_session};
pub use status_list::{session_status_list, token_status_list};
pub use tokens::{issue_token, revoke_token};
