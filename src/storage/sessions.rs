use redb::ReadableTable;

use super::db::{expiry_key, expiry_key_ms, Database, DatabaseError};
use super::models::SessionRecord;
use super::tables::*;

impl Database {
    // ========================================================================
    // Session operations
    // ========================================================================

    /// Store a session
    pub fn put_session(&self, session: &SessionRecord) -> Result<(), DatabaseError> {
        debug_assert!(!session.id.is_empty(), "session id must not be empty");
        debug_assert!(
            !session.subject_id.is_empty(),
            "session subject_id must not be empty"
        );

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSIONS)?;
            let data = rmp_serde::to_vec_named(session)?;
            table.insert(session.id.as_str(), data.as_slice())?;

            let mut expiry_table = write_txn.open_table(SESSION_EXPIRY)?;
            let ek = expiry_key(&session.expires_at, &session.id);
            expiry_table.insert(ek.as_str(), session.id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a session by its id
    pub fn get_session(&self, id: &str) -> Result<Option<SessionRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(SESSIONS)?;

        match table.get(id)? {
            Some(data) => {
                let session: SessionRecord = rmp_serde::from_slice(data.value())?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// Record the session's status list index unless one is already set.
    ///
    /// Returns the index stored on the session after the call (the existing one
    /// if another request got there first), or `None` if the session is gone.
    pub fn set_session_status_index(
        &self,
        id: &str,
        index: i64,
    ) -> Result<Option<i64>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let stored = {
            let mut table = write_txn.open_table(SESSIONS)?;
            let existing: Option<SessionRecord> = match table.get(id)? {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            };

            match existing {
                Some(session) if session.status_list_index.is_some() => session.status_list_index,
                Some(mut session) => {
                    session.status_list_index = Some(index);
                    let data = rmp_serde::to_vec_named(&session)?;
                    table.insert(id, data.as_slice())?;
                    Some(index)
                }
                None => None,
            }
        };
        write_txn.commit()?;
        Ok(stored)
    }

    /// Delete a session, returning the removed record
    pub fn delete_session(&self, id: &str) -> Result<Option<SessionRecord>, DatabaseError> {
        let write_txn = self.begin_write()?;

        let session: Option<SessionRecord> = {
            let mut table = write_txn.open_table(SESSIONS)?;
            let removed = table.remove(id)?;
            match removed {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            }
        };

        if let Some(session) = &session {
            let mut expiry_table = write_txn.open_table(SESSION_EXPIRY)?;
            let ek = expiry_key(&session.expires_at, &session.id);
            expiry_table.remove(ek.as_str())?;
        }

        write_txn.commit()?;
        Ok(session)
    }

    /// Delete expired sessions using the expiration index (no full table scan).
    ///
    /// Returns the removed records so their status indexes can be invalidated.
    pub fn delete_expired_sessions(&self) -> Result<Vec<SessionRecord>, DatabaseError> {
        let now_ms = chrono::Utc::now().timestamp_millis();

        let write_txn = self.begin_write()?;
        let mut removed = Vec::new();
        {
            let mut expiry_table = write_txn.open_table(SESSION_EXPIRY)?;
            let mut expired: Vec<(String, String)> = Vec::new();
            for entry in expiry_table.iter()? {
                let (key, value) = entry?;
                let key_str = key.value().to_string();
                match expiry_key_ms(&key_str) {
                    Some(ms) if ms <= now_ms => expired.push((key_str, value.value().to_string())),
                    _ => break,
                }
            }

            let mut table = write_txn.open_table(SESSIONS)?;
            for (ek, id) in &expired {
                expiry_table.remove(ek.as_str())?;
                let record = table.remove(id.as_str())?;
                if let Some(data) = record {
                    removed.push(rmp_serde::from_slice(data.value())?);
                }
            }
        }
        write_txn.commit()?;
        Ok(removed)
    }

    /// Get all sessions
    pub fn get_all_sessions(&self) -> Result<Vec<SessionRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(SESSIONS)?;

        let mut sessions = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let session: SessionRecord = rmp_serde::from_slice(value.value())?;
            sessions.push(session);
        }

        Ok(sessions)
    }
}
