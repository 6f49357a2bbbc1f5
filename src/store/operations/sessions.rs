use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError, TxResult};

const USER_INDEX_PREFIX: &str = "user:";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token_hash: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl Store {
    pub fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        let key = keys::session_key(&session.token_hash)?;
        let index_key = keys::session_user_index_key(&session.user_id, &session.token_hash)?;
        let session_bytes = Self::serialize(session)?;

        self.sessions.transaction(move |tx| -> TxResult {
            tx.insert(key.as_bytes(), session_bytes.as_slice())?;
            tx.insert(index_key.as_bytes(), &[] as &[u8])?;
            Ok(())
        })?;
        Ok(())
    }

    /// 获取会话，已过期或已撤销时返回 None；清理由 session_cleanup worker 负责。
    pub fn get_session(&self, token_hash: &str) -> Result<Option<Session>, StoreError> {
        let key = keys::session_key(token_hash)?;
        let Some(raw) = self.sessions.get(key.as_bytes())? else {
            return Ok(None);
        };

        let session = Self::deserialize::<Session>(&raw)?;
        if session.revoked || session.expires_at <= Utc::now() {
            return Ok(None);
        }

        Ok(Some(session))
    }

    pub fn delete_session(&self, token_hash: &str) -> Result<(), StoreError> {
        let key = keys::session_key(token_hash)?;
        let index_key = self
            .sessions
            .get(key.as_bytes())?
            .and_then(|raw| Self::deserialize::<Session>(&raw).ok())
            .and_then(|session| keys::session_user_index_key(&session.user_id, token_hash).ok());

        self.sessions.transaction(move |tx| -> TxResult {
            if let Some(ref idx_key) = index_key {
                tx.remove(idx_key.as_bytes())?;
            }
            tx.remove(key.as_bytes())?;
            Ok(())
        })?;
        Ok(())
    }

    fn user_session_hashes(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let prefix = keys::session_user_index_prefix(user_id)?;
        let mut hashes = Vec::new();
        for item in self.sessions.scan_prefix(prefix.as_bytes()) {
            let (k, _) = item?;
            let Ok(key_str) = std::str::from_utf8(&k) else {
                tracing::warn!("Skipping session index key with invalid UTF-8");
                continue;
            };
            if let Some(hash) = key_str.rsplit(':').next() {
                hashes.push(hash.to_string());
            }
        }
        Ok(hashes)
    }

    /// 用户会话数超过 max_sessions 时，从最旧的开始删除
    pub fn cleanup_oldest_user_sessions(
        &self,
        user_id: &str,
        max_sessions: usize,
    ) -> Result<(), StoreError> {
        let mut sessions: Vec<(String, DateTime<Utc>)> = Vec::new();
        for hash in self.user_session_hashes(user_id)? {
            let key = keys::session_key(&hash)?;
            if let Some(raw) = self.sessions.get(key.as_bytes())? {
                if let Ok(session) = Self::deserialize::<Session>(&raw) {
                    sessions.push((hash, session.created_at));
                }
            }
        }

        if sessions.len() <= max_sessions {
            return Ok(());
        }

        sessions.sort_by_key(|(_, created_at)| *created_at);
        let to_remove = sessions.len() - max_sessions;
        for (hash, _) in sessions.into_iter().take(to_remove) {
            self.delete_session(&hash)?;
        }
        Ok(())
    }

    /// Delete expired or revoked sessions, at most 1000 per call.
    pub fn cleanup_expired_sessions(&self) -> Result<u32, StoreError> {
        const MAX_BATCH_SIZE: usize = 1000;

        let now = Utc::now();
        let mut expired = Vec::new();
        for item in self.sessions.iter() {
            let (k, v) = item?;
            if k.starts_with(USER_INDEX_PREFIX.as_bytes()) {
                continue;
            }
            let session: Session = Self::deserialize(&v)?;
            if session.revoked || session.expires_at <= now {
                expired.push(session.token_hash);
                if expired.len() >= MAX_BATCH_SIZE {
                    break;
                }
            }
        }

        let count = expired.len() as u32;
        for token_hash in expired {
            self.delete_session(&token_hash)?;
        }
        Ok(count)
    }
}
