use axum::http::{HeaderMap, Method};
use axum::Router;
use serde_json::Value;

use super::http::{request, response_json};

/// 从 Set-Cookie header 中提取指定 cookie 的值
pub fn extract_cookie_value(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    for value in headers.get_all("set-cookie") {
        if let Ok(s) = value.to_str() {
            if let Some(rest) = s.strip_prefix(&format!("{cookie_name}=")) {
                let val = rest.split(';').next().unwrap_or("");
                if !val.is_empty() {
                    return Some(val.to_string());
                }
            }
        }
    }
    None
}

/// Registers a fresh user and returns the `data` object of the response.
pub async fn register_user(app: &Router) -> Value {
    let email = format!("user-{}@test.com", uuid::Uuid::new_v4());
    let username = format!("user_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);

    let response = request(
        app,
        Method::POST,
        "/api/auth/register",
        Some(serde_json::json!({
            "email": email,
            "username": username,
            "password": "Passw0rd!",
        })),
        &[],
    )
    .await;

    let (status, _headers, body) = response_json(response).await;
    assert!(status.is_success(), "register failed: {body}");
    body["data"].clone()
}

pub async fn login_and_get_token(app: &Router) -> String {
    register_user(app).await["token"]
        .as_str()
        .expect("token in register response")
        .to_string()
}

pub fn auth_header(token: &str) -> String {
    format!("Bearer {token}")
}
