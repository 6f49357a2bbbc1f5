use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::ConflictableTransactionError;
use sled::Transactional;

use crate::store::keys;
use crate::store::operations::organizations::decode_count;
use crate::store::{abort, Store, StoreError, StoreTx};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub form_id: String,
    pub organization_id: String,
    pub name: String,
    pub transcript: Vec<TranscriptEntry>,
    /// Collected values keyed by field name; empty until the conversation finishes.
    pub form_fields_data: BTreeMap<String, String>,
    pub is_finished: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    /// Insert a new conversation and count it against its organization.
    ///
    /// Refused once the form is gone, or with `limit` set once the organization
    /// already holds `limit` conversations. The stored copy is named after the
    /// organization's running conversation number, which is never reused.
    pub fn create_conversation(
        &self,
        conversation: &Conversation,
        limit: Option<u64>,
    ) -> Result<Conversation, StoreError> {
        let form_key = keys::form_key(&conversation.form_id)?;
        let key = keys::conversation_key(&conversation.form_id, &conversation.id)?;
        let count_key = keys::submission_count_key(&conversation.organization_id)?;
        let sequence_key = keys::conversation_sequence_key(&conversation.organization_id)?;

        let stored = (&self.forms, &self.conversations, &self.submission_counts).transaction(
            |(form_tx, conv_tx, count_tx)| -> StoreTx<Conversation> {
                if form_tx.get(form_key.as_bytes())?.is_none() {
                    return abort(StoreError::not_found("form", &conversation.form_id));
                }
                if conv_tx.get(key.as_bytes())?.is_some() {
                    return abort(StoreError::Conflict {
                        entity: "conversation".to_string(),
                        key: conversation.id.clone(),
                    });
                }
                let current = count_tx
                    .get(count_key.as_bytes())?
                    .map(|raw| decode_count(&raw))
                    .unwrap_or(0);
                if let Some(max) = limit.filter(|max| current >= *max) {
                    return abort(StoreError::LimitReached {
                        entity: "submissions".to_string(),
                        limit: max,
                    });
                }
                let sequence = count_tx
                    .get(sequence_key.as_bytes())?
                    .map(|raw| decode_count(&raw))
                    .unwrap_or(0)
                    + 1;

                let mut stored = conversation.clone();
                stored.name = format!("Conversation {sequence}");
                let bytes = Self::serialize(&stored).map_err(ConflictableTransactionError::Abort)?;
                conv_tx.insert(key.as_bytes(), bytes)?;
                count_tx.insert(count_key.as_bytes(), (current + 1).to_be_bytes().to_vec())?;
                count_tx.insert(sequence_key.as_bytes(), sequence.to_be_bytes().to_vec())?;
                Ok(stored)
            },
        )?;
        Ok(stored)
    }

    /// Overwrite an unfinished conversation.
    ///
    /// The stored row is re-read in the same transaction: once it is finished
    /// the write is refused with `Conflict`, so a turn working from an older copy
    /// cannot reopen it or drop its collected data.
    pub fn update_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let key = keys::conversation_key(&conversation.form_id, &conversation.id)?;
        let bytes = Self::serialize(conversation)?;

        self.conversations.transaction(|tx| -> StoreTx<()> {
            let Some(raw) = tx.get(key.as_bytes())? else {
                return abort(StoreError::not_found("conversation", &conversation.id));
            };
            let stored: Conversation =
                Self::deserialize(&raw).map_err(ConflictableTransactionError::Abort)?;
            if stored.is_finished {
                return abort(StoreError::Conflict {
                    entity: "conversation".to_string(),
                    key: conversation.id.clone(),
                });
            }
            tx.insert(key.as_bytes(), bytes.as_slice())?;
            Ok(())
        })?;
        Ok(())
    }

    pub fn get_conversation(
        &self,
        form_id: &str,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, StoreError> {
        // An id that could never be stored names nothing.
        let Ok(key) = keys::conversation_key(form_id, conversation_id) else {
            return Ok(None);
        };
        match self.conversations.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// One page of a form's conversations, newest first, plus the total count.
    pub fn list_conversations(
        &self,
        form_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Conversation>, u64), StoreError> {
        let prefix = keys::conversation_prefix(form_id)?;
        let mut conversations = Vec::new();
        for item in self.conversations.scan_prefix(prefix.as_bytes()) {
            let (_, v) = item?;
            conversations.push(Self::deserialize::<Conversation>(&v)?);
        }
        conversations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = conversations.len() as u64;
        Ok((
            conversations.into_iter().skip(offset).take(limit).collect(),
            total,
        ))
    }
}
