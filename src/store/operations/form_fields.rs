use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    pub id: String,
    pub form_id: String,
    /// Human readable name; also the key of the collected value.
    pub field_name: String,
    /// Used while generating the question for this field.
    pub field_description: String,
    pub field_configuration: FieldConfiguration,
    pub position: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "inputType",
    content = "inputConfiguration",
    rename_all = "camelCase"
)]
pub enum FieldConfiguration {
    Text(TextInputConfig),
    MultipleChoice(MultipleChoiceInputConfig),
}

impl Default for FieldConfiguration {
    fn default() -> Self {
        Self::Text(TextInputConfig::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextInputConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipleChoiceInputConfig {
    pub options: Vec<ChoiceOption>,
    pub allow_multiple: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceOption {
    pub option_name: String,
    pub value: String,
}

impl Store {
    /// Write a field row and point its name index entry at it.
    ///
    /// Does not check the name; dashboard writes go through
    /// `create_form_field` and `update_form_field`.
    pub fn upsert_form_field(&self, field: &FormField) -> Result<(), StoreError> {
        let key = keys::form_field_key(&field.form_id, &field.id)?;
        let name_key = keys::form_field_name_key(&field.form_id, &field.field_name)?;
        self.form_fields
            .insert(key.as_bytes(), Self::serialize(field)?)?;
        self.form_field_names
            .insert(name_key.as_bytes(), field.id.as_bytes())?;
        Ok(())
    }

    /// Add a field whose name is not yet taken on its form (case-insensitive).
    pub fn create_form_field(&self, field: &FormField) -> Result<(), StoreError> {
        self.claim_field_name(&field.form_id, &field.field_name, &field.id)?;
        self.upsert_form_field(field)
    }

    /// Store an edited field. A new name is claimed before the write and the
    /// old one released after it.
    pub fn update_form_field(
        &self,
        previous: &FormField,
        field: &FormField,
    ) -> Result<(), StoreError> {
        let old_key = keys::form_field_name_key(&previous.form_id, &previous.field_name)?;
        let new_key = keys::form_field_name_key(&field.form_id, &field.field_name)?;
        if old_key != new_key {
            self.claim_field_name(&field.form_id, &field.field_name, &field.id)?;
        }
        self.upsert_form_field(field)?;
        if old_key != new_key {
            self.release_field_name(&old_key, &field.id)?;
        }
        Ok(())
    }

    fn claim_field_name(
        &self,
        form_id: &str,
        field_name: &str,
        field_id: &str,
    ) -> Result<(), StoreError> {
        let name_key = keys::form_field_name_key(form_id, field_name)?;
        match self.form_field_names.compare_and_swap(
            name_key.as_bytes(),
            None::<&[u8]>,
            Some(field_id.as_bytes()),
        )? {
            Ok(()) => Ok(()),
            Err(cas) if cas.current.as_deref() == Some(field_id.as_bytes()) => Ok(()),
            Err(_) => Err(StoreError::Conflict {
                entity: "form_field_name".to_string(),
                key: field_name.to_string(),
            }),
        }
    }

    /// Drop a name entry only while it still points at `field_id`.
    fn release_field_name(&self, name_key: &str, field_id: &str) -> Result<(), StoreError> {
        let _ = self.form_field_names.compare_and_swap(
            name_key.as_bytes(),
            Some(field_id.as_bytes()),
            None::<&[u8]>,
        )?;
        Ok(())
    }

    pub fn get_form_field(
        &self,
        form_id: &str,
        field_id: &str,
    ) -> Result<Option<FormField>, StoreError> {
        let Ok(key) = keys::form_field_key(form_id, field_id) else {
            return Ok(None);
        };
        match self.form_fields.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Fields of a form in display order.
    pub fn list_form_fields(&self, form_id: &str) -> Result<Vec<FormField>, StoreError> {
        let prefix = keys::form_field_prefix(form_id)?;
        let mut fields = Vec::new();
        for item in self.form_fields.scan_prefix(prefix.as_bytes()) {
            let (_, v) = item?;
            fields.push(Self::deserialize::<FormField>(&v)?);
        }
        fields.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(fields)
    }

    /// Position for a field appended after the current last one.
    pub fn next_field_position(&self, form_id: &str) -> Result<u32, StoreError> {
        Ok(self
            .list_form_fields(form_id)?
            .iter()
            .map(|f| f.position + 1)
            .max()
            .unwrap_or(0))
    }

    pub fn delete_form_field(&self, form_id: &str, field_id: &str) -> Result<(), StoreError> {
        let field = self
            .get_form_field(form_id, field_id)?
            .ok_or_else(|| StoreError::not_found("form_field", field_id))?;
        let key = keys::form_field_key(form_id, field_id)?;
        if self.form_fields.remove(key.as_bytes())?.is_none() {
            return Err(StoreError::not_found("form_field", field_id));
        }
        let name_key = keys::form_field_name_key(form_id, &field.field_name)?;
        self.release_field_name(&name_key, field_id)
    }
}
