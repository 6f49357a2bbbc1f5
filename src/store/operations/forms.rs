use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sled::transaction::ConflictableTransactionError;
use sled::Transactional;

use crate::store::keys;
use crate::store::operations::organizations::decode_count;
use crate::store::{abort, Store, StoreError, StoreTx};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    pub id: String,
    pub organization_id: String,
    pub workspace_id: String,
    pub name: String,
    /// Context given to the model when it drives a conversation.
    pub overview: String,
    pub welcome_screen_title: String,
    pub welcome_screen_message: String,
    pub welcome_screen_cta_label: String,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    pub fn upsert_form(&self, form: &Form) -> Result<(), StoreError> {
        let key = keys::form_key(&form.id)?;
        self.forms.insert(key.as_bytes(), Self::serialize(form)?)?;
        Ok(())
    }

    pub fn get_form(&self, form_id: &str) -> Result<Option<Form>, StoreError> {
        let Ok(key) = keys::form_key(form_id) else {
            return Ok(None);
        };
        match self.forms.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Forms of one workspace, newest first.
    pub fn list_forms_by_workspace(&self, workspace_id: &str) -> Result<Vec<Form>, StoreError> {
        let mut forms = Vec::new();
        for item in self.forms.iter() {
            let (_, v) = item?;
            let form: Form = Self::deserialize(&v)?;
            if form.workspace_id == workspace_id {
                forms.push(form);
            }
        }
        forms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(forms)
    }

    /// Delete a form with its fields and conversations.
    ///
    /// The form row goes first; `create_conversation` checks it inside its own
    /// transaction, so no conversation can be added once the removal commits.
    /// Removed conversations no longer count against the organization's quota.
    pub fn delete_form(&self, form_id: &str) -> Result<(), StoreError> {
        let key = keys::form_key(form_id)?;
        let form: Form = self.forms.transaction(|tx| -> StoreTx<Form> {
            match tx.remove(key.as_bytes())? {
                Some(raw) => Self::deserialize(&raw).map_err(ConflictableTransactionError::Abort),
                None => abort(StoreError::not_found("form", form_id)),
            }
        })?;

        let removed = self.purge_conversations(&form)?;

        let field_prefix = keys::form_field_prefix(form_id)?;
        for item in self.form_fields.scan_prefix(field_prefix.as_bytes()) {
            let (k, _) = item?;
            self.form_fields.remove(k)?;
        }
        for item in self.form_field_names.scan_prefix(field_prefix.as_bytes()) {
            let (k, _) = item?;
            self.form_field_names.remove(k)?;
        }

        tracing::info!(form_id, conversations_removed = removed, "Form deleted");
        Ok(())
    }

    /// Drop every conversation of `form` and release them from the
    /// organization counter in one transaction.
    fn purge_conversations(&self, form: &Form) -> Result<u64, StoreError> {
        let prefix = keys::conversation_prefix(&form.id)?;
        let mut conversation_keys = Vec::new();
        for item in self.conversations.scan_prefix(prefix.as_bytes()) {
            let (k, _) = item?;
            conversation_keys.push(k);
        }
        if conversation_keys.is_empty() {
            return Ok(0);
        }

        let count_key = keys::submission_count_key(&form.organization_id)?;
        let removed = (&self.conversations, &self.submission_counts).transaction(
            |(conv_tx, count_tx)| -> StoreTx<u64> {
                let mut removed = 0u64;
                for k in &conversation_keys {
                    if conv_tx.remove(k.clone())?.is_some() {
                        removed += 1;
                    }
                }
                let current = count_tx
                    .get(count_key.as_bytes())?
                    .map(|raw| decode_count(&raw))
                    .unwrap_or(0);
                count_tx.insert(
                    count_key.as_bytes(),
                    current.saturating_sub(removed).to_be_bytes().to_vec(),
                )?;
                Ok(removed)
            },
        )?;
        Ok(removed)
    }
}
