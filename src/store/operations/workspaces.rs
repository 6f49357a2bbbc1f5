use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    pub fn upsert_workspace(&self, workspace: &Workspace) -> Result<(), StoreError> {
        let key = keys::workspace_key(&workspace.id)?;
        self.workspaces
            .insert(key.as_bytes(), Self::serialize(workspace)?)?;
        Ok(())
    }

    pub fn get_workspace(&self, workspace_id: &str) -> Result<Option<Workspace>, StoreError> {
        let Ok(key) = keys::workspace_key(workspace_id) else {
            return Ok(None);
        };
        match self.workspaces.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Workspaces of one organization, oldest first.
    pub fn list_workspaces(&self, organization_id: &str) -> Result<Vec<Workspace>, StoreError> {
        let mut workspaces = Vec::new();
        for item in self.workspaces.iter() {
            let (_, v) = item?;
            let workspace: Workspace = Self::deserialize(&v)?;
            if workspace.organization_id == organization_id {
                workspaces.push(workspace);
            }
        }
        workspaces.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(workspaces)
    }

    /// Delete a workspace together with its forms. Returns the number of forms removed.
    ///
    /// The workspace row goes first so that form creation, which looks it up,
    /// stops finding it before its forms are swept.
    pub fn delete_workspace(&self, workspace_id: &str) -> Result<usize, StoreError> {
        let key = keys::workspace_key(workspace_id)?;
        self.workspaces
            .remove(key.as_bytes())?
            .ok_or_else(|| StoreError::not_found("workspace", workspace_id))?;

        let mut removed = 0;
        for form in self.list_forms_by_workspace(workspace_id)? {
            match self.delete_form(&form.id) {
                Ok(()) => removed += 1,
                // Already deleted by a concurrent request.
                Err(StoreError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }
}
