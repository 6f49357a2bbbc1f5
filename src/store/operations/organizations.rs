use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

/// Owner of workspaces, forms and the submission quota.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub owner_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub fn upsert_organization(&self, organization: &Organization) -> Result<(), StoreError> {
        let key = keys::organization_key(&organization.id)?;
        self.organizations
            .insert(key.as_bytes(), Self::serialize(organization)?)?;
        Ok(())
    }

    pub fn get_organization(
        &self,
        organization_id: &str,
    ) -> Result<Option<Organization>, StoreError> {
        let key = keys::organization_key(organization_id)?;
        match self.organizations.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Conversations collected by the organization across all of its forms.
    pub fn count_submissions(&self, organization_id: &str) -> Result<u64, StoreError> {
        let key = keys::submission_count_key(organization_id)?;
        Ok(self
            .submission_counts
            .get(key.as_bytes())?
            .map(|raw| decode_count(&raw))
            .unwrap_or(0))
    }
}

pub(crate) fn decode_count(raw: &[u8]) -> u64 {
    let bytes: [u8; 8] = raw.try_into().unwrap_or([0; 8]);
    u64::from_be_bytes(bytes)
}
