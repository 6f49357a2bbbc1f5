/// 公共验证函数模块
/// 账户字段（密码、邮箱、用户名）以及工作区、表单、字段的输入验证，供各路由共用。
use crate::constants::{MAX_FORM_OVERVIEW_CHARS, MAX_NAME_CHARS};
use crate::store::operations::form_fields::FieldConfiguration;

/// 验证密码强度：至少 8 字符、最多 256 字符，需包含大小写字母和数字
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters");
    }
    if password.len() > 256 {
        return Err("Password must be at most 256 characters");
    }
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_upper || !has_lower || !has_digit {
        return Err("Password needs an uppercase letter, a lowercase letter and a digit");
    }
    Ok(())
}

/// 验证邮箱格式：user@domain.tld
pub fn is_valid_email(email: &str) -> bool {
    if email.len() > 254 {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || local.len() > 64 {
        return false;
    }
    if !local
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'+' || b == b'-')
    {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }
    if domain.is_empty() || !domain.contains('.') {
        return false;
    }
    if !domain
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.')
    {
        return false;
    }
    domain
        .split('.')
        .all(|part| !part.is_empty() && !part.starts_with('-') && !part.ends_with('-'))
}

/// 验证用户名格式：2-50 字符，只允许字母、数字、下划线、连字符和空格
pub fn validate_username(username: &str) -> Result<(), &'static str> {
    let char_count = username.chars().count();
    if !(2..=50).contains(&char_count) {
        return Err("Username must be between 2 and 50 characters");
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ' ')
    {
        return Err("Username may only contain letters, digits, '_', '-' and spaces");
    }
    Ok(())
}

/// Trimmed workspace or form name, 1..=100 characters.
pub fn validate_name(name: &str) -> Result<String, String> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > MAX_NAME_CHARS {
        return Err(format!(
            "Name must be between 1 and {MAX_NAME_CHARS} characters"
        ));
    }
    Ok(trimmed.to_string())
}

/// Form overview may be empty while the form is being drafted.
pub fn validate_overview(overview: &str) -> Result<String, String> {
    let trimmed = overview.trim();
    if trimmed.chars().count() > MAX_FORM_OVERVIEW_CHARS {
        return Err(format!(
            "Overview must be at most {MAX_FORM_OVERVIEW_CHARS} characters"
        ));
    }
    Ok(trimmed.to_string())
}

/// Welcome screen texts: non-empty, at most 500 characters.
pub fn validate_welcome_text(value: &str, label: &str) -> Result<String, String> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > 500 {
        return Err(format!("{label} must be between 1 and 500 characters"));
    }
    Ok(trimmed.to_string())
}

/// Field name and description are both required; the name doubles as the data key.
pub fn validate_field_text(value: &str, label: &str) -> Result<String, String> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > 500 {
        return Err(format!("{label} must be between 1 and 500 characters"));
    }
    Ok(trimmed.to_string())
}

pub fn validate_field_configuration(config: &FieldConfiguration) -> Result<(), String> {
    match config {
        FieldConfiguration::Text(text) => {
            if text
                .placeholder
                .as_deref()
                .is_some_and(|p| p.trim().is_empty())
            {
                return Err("Placeholder must not be empty".to_string());
            }
            if text.max_length == Some(0) {
                return Err("maxLength must be positive".to_string());
            }
        }
        FieldConfiguration::MultipleChoice(choice) => {
            if choice.options.len() < 2 {
                return Err("Multiple choice fields need at least 2 options".to_string());
            }
            for option in &choice.options {
                if option.option_name.trim().is_empty() || option.value.trim().is_empty() {
                    return Err("Choice options need a name and a value".to_string());
                }
            }
        }
    }
    Ok(())
}
