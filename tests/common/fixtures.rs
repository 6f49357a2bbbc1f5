use axum::http::{Method, StatusCode};
use axum::Router;
use serde_json::{json, Value};

use super::auth::auth_header;
use super::http::{request, response_json};

pub async fn call(
    app: &Router,
    method: Method,
    path: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let headers: Vec<(&str, String)> = token
        .map(|t| vec![("authorization", auth_header(t))])
        .unwrap_or_default();
    let response = request(app, method, path, body, &headers).await;
    let (status, _, body) = response_json(response).await;
    (status, body)
}

pub async fn create_workspace(app: &Router, token: &str, name: &str) -> Value {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/workspaces",
        Some(json!({ "name": name })),
        Some(token),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create workspace failed: {body}");
    body["data"].clone()
}

pub async fn create_form(app: &Router, token: &str, workspace_id: &str, overview: &str) -> Value {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/forms",
        Some(json!({
            "workspaceId": workspace_id,
            "name": "Event RSVP",
            "overview": overview,
        })),
        Some(token),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create form failed: {body}");
    body["data"].clone()
}

pub async fn add_field(app: &Router, token: &str, form_id: &str, name: &str) -> Value {
    let (status, body) = call(
        app,
        Method::POST,
        &format!("/api/forms/{form_id}/fields"),
        Some(json!({
            "fieldName": name,
            "fieldDescription": format!("The respondent's {name}"),
        })),
        Some(token),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "add field failed: {body}");
    body["data"].clone()
}

pub async fn set_published(app: &Router, token: &str, form_id: &str, published: bool) {
    let (status, body) = call(
        app,
        Method::PATCH,
        &format!("/api/forms/{form_id}/publish"),
        Some(json!({ "isPublished": published })),
        Some(token),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "publish failed: {body}");
}

/// Workspace plus a form with `Name` and `Email` fields; returns the form id.
pub async fn ready_form(app: &Router, token: &str, publish: bool) -> String {
    let workspace = create_workspace(app, token, "Events").await;
    let form = create_form(
        app,
        token,
        workspace["id"].as_str().unwrap(),
        "RSVP for the summer meetup",
    )
    .await;
    let form_id = form["id"].as_str().unwrap().to_string();
    add_field(app, token, &form_id, "Name").await;
    add_field(app, token, &form_id, "Email").await;
    if publish {
        set_published(app, token, &form_id, true).await;
    }
    form_id
}

/// One conversation turn as an anonymous visitor (or a member when `token` is set).
pub async fn turn(
    app: &Router,
    form_id: &str,
    payload: Value,
    token: Option<&str>,
) -> (StatusCode, Value) {
    call(
        app,
        Method::POST,
        &format!("/api/form/{form_id}/conversation"),
        Some(payload),
        token,
    )
    .await
}
