use chrono::Utc;

use crate::constants::{
    DEFAULT_WELCOME_CTA, DEFAULT_WELCOME_MESSAGE, DEMO_FORM_ID, DEMO_ORGANIZATION_ID,
};
use crate::store::operations::form_fields::{FieldConfiguration, FormField, TextInputConfig};
use crate::store::operations::forms::Form;
use crate::store::operations::organizations::Organization;
use crate::store::operations::workspaces::Workspace;
use crate::store::{Store, StoreError};

const VERSION_KEY: &str = "_meta:version";
const DEMO_WORKSPACE_ID: &str = "demo";

type MigrationFn = fn(&Store) -> Result<(), StoreError>;

fn migrations() -> Vec<(&'static str, MigrationFn)> {
    vec![
        ("001_initial", m001_initial),
        ("002_seed_demo_form", m002_seed_demo_form),
    ]
}

/// 执行所有未应用的迁移。
///
/// - 每个迁移必须幂等：迁移成功但版本号写入前崩溃时，重启后会再次执行。
/// - 版本号在每个迁移成功后立即持久化。
/// - 仅向前：set_version 拒绝降级。
pub fn run(store: &Store) -> Result<(), StoreError> {
    let current = get_current_version(store)?;

    for (index, (name, func)) in migrations().iter().enumerate() {
        let version = (index + 1) as u32;
        if version > current {
            tracing::info!(version, name, "Running migration");
            func(store)?;
            set_version(store, version)?;
            tracing::info!(version, name, "Migration complete");
        } else {
            tracing::debug!(version, name, "Migration already applied, skipping");
        }
    }

    Ok(())
}

pub fn get_current_version(store: &Store) -> Result<u32, StoreError> {
    match store.meta.get(VERSION_KEY.as_bytes())? {
        Some(raw) => {
            let bytes: [u8; 4] = raw.as_ref().try_into().map_err(|_| StoreError::Migration {
                version: 0,
                message: "stored schema version is corrupt".to_string(),
            })?;
            Ok(u32::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

pub fn set_version(store: &Store, version: u32) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    if version < current {
        return Err(StoreError::Migration {
            version,
            message: format!("Refuse to downgrade from {} to {}", current, version),
        });
    }

    store
        .meta
        .insert(VERSION_KEY.as_bytes(), version.to_be_bytes().to_vec())?;
    Ok(())
}

fn m001_initial(_store: &Store) -> Result<(), StoreError> {
    Ok(())
}

/// Public demo form used by the landing page. It never counts against a quota.
fn m002_seed_demo_form(store: &Store) -> Result<(), StoreError> {
    if store.get_form(DEMO_FORM_ID)?.is_some() {
        return Ok(());
    }

    let now = Utc::now();
    store.upsert_organization(&Organization {
        id: DEMO_ORGANIZATION_ID.to_string(),
        name: "ConvoForm demo".to_string(),
        owner_user_id: None,
        created_at: now,
    })?;
    store.upsert_workspace(&Workspace {
        id: DEMO_WORKSPACE_ID.to_string(),
        organization_id: DEMO_ORGANIZATION_ID.to_string(),
        name: "Demo".to_string(),
        created_at: now,
        updated_at: now,
    })?;
    store.upsert_form(&Form {
        id: DEMO_FORM_ID.to_string(),
        organization_id: DEMO_ORGANIZATION_ID.to_string(),
        workspace_id: DEMO_WORKSPACE_ID.to_string(),
        name: "Product feedback".to_string(),
        overview: "We are gathering feedback from people who tried ConvoForm, \
                   a tool that turns forms into conversations."
            .to_string(),
        welcome_screen_title: "Tell us what you think".to_string(),
        welcome_screen_message: DEFAULT_WELCOME_MESSAGE.to_string(),
        welcome_screen_cta_label: DEFAULT_WELCOME_CTA.to_string(),
        is_published: true,
        created_at: now,
        updated_at: now,
    })?;

    let fields = [
        ("Full Name", "Name of the person giving feedback"),
        ("Email Address", "Email to follow up on the feedback"),
        ("Feedback", "What the person liked or disliked about the product"),
    ];
    for (position, (name, description)) in fields.iter().enumerate() {
        store.upsert_form_field(&FormField {
            id: format!("demo-field-{position}"),
            form_id: DEMO_FORM_ID.to_string(),
            field_name: name.to_string(),
            field_description: description.to_string(),
            field_configuration: FieldConfiguration::Text(TextInputConfig::default()),
            position: position as u32,
            created_at: now,
            updated_at: now,
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn migration_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();

        run(&store).unwrap();
        let first = get_current_version(&store).unwrap();
        run(&store).unwrap();
        let second = get_current_version(&store).unwrap();

        assert_eq!(first, 2);
        assert_eq!(second, 2);
    }

    #[test]
    fn demo_form_is_seeded_and_published() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db-demo").to_str().unwrap()).unwrap();

        run(&store).unwrap();
        let form = store.get_form(DEMO_FORM_ID).unwrap().unwrap();
        assert!(form.is_published);
        assert_eq!(store.list_form_fields(DEMO_FORM_ID).unwrap().len(), 3);
    }

    #[test]
    fn downgrade_is_rejected() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db2").to_str().unwrap()).unwrap();

        set_version(&store, 3).unwrap();
        let err = set_version(&store, 2).unwrap_err();
        assert!(matches!(err, StoreError::Migration { .. }));
    }
}
