use redb::{ReadableTable, Table};

use super::db::{expiry_key, expiry_key_ms, Database, DatabaseError};
use super::models::TokenRecord;
use super::tables::*;

/// Remove `jti` from the session -> tokens secondary index.
fn unlink_from_session(
    index_table: &mut Table<'_, &'static str, &'static [u8]>,
    session_id: &str,
    jti: &str,
) -> Result<(), DatabaseError> {
    let ids: Option<Vec<String>> = match index_table.get(session_id)? {
        Some(data) => Some(rmp_serde::from_slice(data.value())?),
        None => None,
    };

    if let Some(mut ids) = ids {
        ids.retain(|id| id != jti);
        if ids.is_empty() {
            index_table.remove(session_id)?;
        } else {
            let data = rmp_serde::to_vec_named(&ids)?;
            index_table.insert(session_id, data.as_slice())?;
        }
    }
    Ok(())
}

impl Database {
    // ========================================================================
    // Access token operations
    // ========================================================================

    /// Store an access token record
    pub fn put_token(&self, token: &TokenRecord) -> Result<(), DatabaseError> {
        debug_assert!(!token.id.is_empty(), "token id must not be empty");

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(TOKENS)?;
            let data = rmp_serde::to_vec_named(token)?;
            table.insert(token.id.as_str(), data.as_slice())?;

            if let Some(session_id) = token.session_id.as_deref() {
                let mut index_table = write_txn.open_table(SESSION_TOKENS)?;
                let mut ids: Vec<String> = index_table
                    .get(session_id)?
                    .map(|v| rmp_serde::from_slice(v.value()))
                    .transpose()?
                    .unwrap_or_default();

                if !ids.contains(&token.id) {
                    ids.push(token.id.clone());
                    let index_data = rmp_serde::to_vec_named(&ids)?;
                    index_table.insert(session_id, index_data.as_slice())?;
                }
            }

            let mut expiry_table = write_txn.open_table(TOKEN_EXPIRY)?;
            let ek = expiry_key(&token.expires_at, &token.id);
            expiry_table.insert(ek.as_str(), token.id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a token record by `jti`
    pub fn get_token(&self, id: &str) -> Result<Option<TokenRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(TOKENS)?;

        match table.get(id)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// Record the token's status list index unless one is already set.
    pub fn set_token_status_index(
        &self,
        id: &str,
        index: i64,
    ) -> Result<Option<i64>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let stored = {
            let mut table = write_txn.open_table(TOKENS)?;
            let existing: Option<TokenRecord> = match table.get(id)? {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            };

            match existing {
                Some(token) if token.status_list_index.is_some() => token.status_list_index,
                Some(mut token) => {
                    token.status_list_index = Some(index);
                    let data = rmp_serde::to_vec_named(&token)?;
                    table.insert(id, data.as_slice())?;
                    Some(index)
                }
                None => None,
            }
        };
        write_txn.commit()?;
        Ok(stored)
    }

    /// Delete a token record, returning it
    pub fn delete_token(&self, id: &str) -> Result<Option<TokenRecord>, DatabaseError> {
        let write_txn = self.begin_write()?;

        let token: Option<TokenRecord> = {
            let mut table = write_txn.open_table(TOKENS)?;
            let removed = table.remove(id)?;
            match removed {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            }
        };

        if let Some(token) = &token {
            if let Some(session_id) = token.session_id.as_deref() {
                let mut index_table = write_txn.open_table(SESSION_TOKENS)?;
                unlink_from_session(&mut index_table, session_id, &token.id)?;
            }
            let mut expiry_table = write_txn.open_table(TOKEN_EXPIRY)?;
            let ek = expiry_key(&token.expires_at, &token.id);
            expiry_table.remove(ek.as_str())?;
        }

        write_txn.commit()?;
        Ok(token)
    }

    /// Delete every token issued within a session, returning the removed records
    pub fn delete_tokens_by_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<TokenRecord>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let mut removed = Vec::new();
        {
            let mut index_table = write_txn.open_table(SESSION_TOKENS)?;
            let ids: Vec<String> = match index_table.remove(session_id)? {
                Some(data) => rmp_serde::from_slice(data.value())?,
                None => Vec::new(),
            };

            let mut table = write_txn.open_table(TOKENS)?;
            let mut expiry_table = write_txn.open_table(TOKEN_EXPIRY)?;
            for id in ids {
                let record = table.remove(id.as_str())?;
                if let Some(data) = record {
                    let token: TokenRecord = rmp_serde::from_slice(data.value())?;
                    let ek = expiry_key(&token.expires_at, &token.id);
                    expiry_table.remove(ek.as_str())?;
                    removed.push(token);
                }
            }
        }
        write_txn.commit()?;
        Ok(removed)
    }

    /// Delete expired tokens using the expiration index.
    pub fn delete_expired_tokens(&self) -> Result<Vec<TokenRecord>, DatabaseError> {
        let now_ms = chrono::Utc::now().timestamp_millis();

        let write_txn = self.begin_write()?;
        let mut removed = Vec::new();
        {
            let mut expiry_table = write_txn.open_table(TOKEN_EXPIRY)?;
            let mut expired: Vec<(String, String)> = Vec::new();
            for entry in expiry_table.iter()? {
                let (key, value) = entry?;
                let key_str = key.value().to_string();
                match expiry_key_ms(&key_str) {
                    Some(ms) if ms <= now_ms => expired.push((key_str, value.value().to_string())),
                    _ => break,
                }
            }

            let mut table = write_txn.open_table(TOKENS)?;
            let mut index_table = write_txn.open_table(SESSION_TOKENS)?;
            for (ek, id) in &expired {
                expiry_table.remove(ek.as_str())?;
                let record = table.remove(id.as_str())?;
                if let Some(data) = record {
                    let token: TokenRecord = rmp_serde::from_slice(data.value())?;
                    if let Some(session_id) = token.session_id.as_deref() {
                        unlink_from_session(&mut index_table, session_id, &token.id)?;
                    }
                    removed.push(token);
                }
            }
        }
        write_txn.commit()?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{make_token, setup_db};

    #[test]
    fn test_delete_tokens_by_session() {
        let (db, _temp) = setup_db();
        db.put_token(&make_token("t1", Some("s1"))).unwrap();
        db.put_token(&make_token("t2", Some("s1"))).unwrap();
        db.put_token(&make_token("t3", Some("s2"))).unwrap();

        let removed = db.delete_tokens_by_session("s1").unwrap();
        let mut ids: Vec<_> = removed.iter().map(|t| t.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["t1", "t2"]);
        assert!(db.get_token("t1").unwrap().is_none());
        assert!(db.get_token("t3").unwrap().is_some());
        assert!(db.delete_tokens_by_session("s1").unwrap().is_empty());
    }

    #[test]
    fn test_delete_token_unlinks_session_index() {
        let (db, _temp) = setup_db();
        db.put_token(&make_token("t1", Some("s1"))).unwrap();
        db.put_token(&make_token("t2", Some("s1"))).unwrap();

        assert!(db.delete_token("t1").unwrap().is_some());
        let removed = db.delete_tokens_by_session("s1").unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, "t2");
    }

    #[test]
    fn test_delete_expired_tokens() {
        let (db, _temp) = setup_db();
        let mut old = make_token("old", None);
        old.expires_at = chrono::Utc::now() - chrono::Duration::seconds(1);
        db.put_token(&old).unwrap();
        db.put_token(&make_token("fresh", None)).unwrap();

        let removed = db.delete_expired_tokens().unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, "old");
        assert!(db.get_token("fresh").unwrap().is_some());
    }

    #[test]
    fn test_token_status_index_is_set_once() {
        let (db, _temp) = setup_db();
        db.put_token(&make_token("t1", None)).unwrap();

        assert_eq!(db.set_token_status_index("t1", 3).unwrap(), Some(3));
        assert_eq!(db.set_token_status_index("t1", 4).unwrap(), Some(3));
    }
}
