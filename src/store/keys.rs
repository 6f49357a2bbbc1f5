use crate::store::StoreError;

const MAX_ID_LEN: usize = 128;

/// Ids are embedded in composite `a:b` keys, so they must not contain the separator.
fn checked(id: &str, what: &str) -> Result<(), StoreError> {
    if id.is_empty() || id.len() > MAX_ID_LEN || id.contains(':') {
        return Err(StoreError::Validation(format!("invalid {what} id")));
    }
    Ok(())
}

pub fn user_key(user_id: &str) -> Result<String, StoreError> {
    checked(user_id, "user")?;
    Ok(user_id.to_string())
}

pub fn user_email_index_key(email: &str) -> String {
    format!("email:{}", email.to_lowercase())
}

pub fn session_key(token_hash: &str) -> Result<String, StoreError> {
    checked(token_hash, "session")?;
    Ok(token_hash.to_string())
}

pub fn session_user_index_key(user_id: &str, token_hash: &str) -> Result<String, StoreError> {
    checked(user_id, "user")?;
    checked(token_hash, "session")?;
    Ok(format!("user:{}:{}", user_id, token_hash))
}

pub fn session_user_index_prefix(user_id: &str) -> Result<String, StoreError> {
    checked(user_id, "user")?;
    Ok(format!("user:{}:", user_id))
}

pub fn organization_key(organization_id: &str) -> Result<String, StoreError> {
    checked(organization_id, "organization")?;
    Ok(organization_id.to_string())
}

pub fn workspace_key(workspace_id: &str) -> Result<String, StoreError> {
    checked(workspace_id, "workspace")?;
    Ok(workspace_id.to_string())
}

pub fn form_key(form_id: &str) -> Result<String, StoreError> {
    checked(form_id, "form")?;
    Ok(form_id.to_string())
}

pub fn form_field_key(form_id: &str, field_id: &str) -> Result<String, StoreError> {
    checked(form_id, "form")?;
    checked(field_id, "field")?;
    Ok(format!("{}:{}", form_id, field_id))
}

pub fn form_field_prefix(form_id: &str) -> Result<String, StoreError> {
    checked(form_id, "form")?;
    Ok(format!("{}:", form_id))
}

/// Name index entry; names compare case-insensitively within one form.
pub fn form_field_name_key(form_id: &str, field_name: &str) -> Result<String, StoreError> {
    checked(form_id, "form")?;
    Ok(format!("{}:{}", form_id, field_name.trim().to_lowercase()))
}

pub fn conversation_key(form_id: &str, conversation_id: &str) -> Result<String, StoreError> {
    checked(form_id, "form")?;
    checked(conversation_id, "conversation")?;
    Ok(format!("{}:{}", form_id, conversation_id))
}

pub fn conversation_prefix(form_id: &str) -> Result<String, StoreError> {
    checked(form_id, "form")?;
    Ok(format!("{}:", form_id))
}

pub fn submission_count_key(organization_id: &str) -> Result<String, StoreError> {
    checked(organization_id, "organization")?;
    Ok(organization_id.to_string())
}

/// Running conversation number of an organization. Shares the counter tree;
/// the `seq:` prefix cannot clash because ids never contain ':'.
pub fn conversation_sequence_key(organization_id: &str) -> Result<String, StoreError> {
    checked(organization_id, "organization")?;
    Ok(format!("seq:{}", organization_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_index_is_normalized() {
        assert_eq!(user_email_index_key("A@Ex.com"), "email:a@ex.com");
    }

    #[test]
    fn composite_keys_share_form_prefix() {
        let key = form_field_key("f1", "x1").unwrap();
        assert!(key.starts_with(&form_field_prefix("f1").unwrap()));
        assert!(!key.starts_with(&form_field_prefix("f").unwrap()));
    }

    #[test]
    fn separator_in_id_is_rejected() {
        assert!(matches!(
            conversation_key("f1", "a:b"),
            Err(StoreError::Validation(_))
        ));
        assert!(form_key("").is_err());
    }

    #[test]
    fn field_name_index_ignores_case_and_padding() {
        assert_eq!(
            form_field_name_key("f1", " Email ").unwrap(),
            form_field_name_key("f1", "email").unwrap()
        );
        assert_ne!(
            form_field_name_key("f1", "Email").unwrap(),
            form_field_name_key("f2", "Email").unwrap()
        );
        assert_ne!(
            conversation_sequence_key("org1").unwrap(),
            submission_count_key("org1").unwrap()
        );
    }
}
