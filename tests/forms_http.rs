mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::app::spawn_test_server;
use common::auth::login_and_get_token;
use common::fixtures::{add_field, call, create_form, create_workspace, ready_form, turn};
use common::http::assert_json_error;

#[tokio::test]
async fn it_form_create_has_defaults() {
    let app = spawn_test_server().await;
    let token = login_and_get_token(&app.app).await;
    let workspace = create_workspace(&app.app, &token, "Events").await;

    let (status, body) = call(
        &app.app,
        Method::POST,
        "/api/forms",
        Some(json!({ "workspaceId": workspace["id"] })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let form = &body["data"];
    assert_eq!(form["name"], "New Form");
    assert_eq!(form["overview"], "");
    assert_eq!(form["isPublished"], false);
    assert_eq!(form["welcomeScreenCtaLabel"], "Start");
    assert!(form["formFields"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn it_form_create_in_foreign_workspace_is_404() {
    let app = spawn_test_server().await;
    let owner = login_and_get_token(&app.app).await;
    let stranger = login_and_get_token(&app.app).await;
    let workspace = create_workspace(&app.app, &owner, "Events").await;

    let (status, _) = call(
        &app.app,
        Method::POST,
        "/api/forms",
        Some(json!({ "workspaceId": workspace["id"] })),
        Some(&stranger),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn it_form_update_validates_overview() {
    let app = spawn_test_server().await;
    let token = login_and_get_token(&app.app).await;
    let workspace = create_workspace(&app.app, &token, "Events").await;
    let form = create_form(&app.app, &token, workspace["id"].as_str().unwrap(), "").await;
    let form_id = form["id"].as_str().unwrap();

    let (status, body) = call(
        &app.app,
        Method::PATCH,
        &format!("/api/forms/{form_id}"),
        Some(json!({ "overview": "x".repeat(256) })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "FORM_INVALID_PAYLOAD");

    let (status, body) = call(
        &app.app,
        Method::PATCH,
        &format!("/api/forms/{form_id}"),
        Some(json!({
            "overview": "Collect RSVPs",
            "welcomeScreenTitle": "Join us",
        })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["overview"], "Collect RSVPs");
    assert_eq!(body["data"]["welcomeScreenTitle"], "Join us");
}

#[tokio::test]
async fn it_form_fields_lifecycle() {
    let app = spawn_test_server().await;
    let token = login_and_get_token(&app.app).await;
    let workspace = create_workspace(&app.app, &token, "Events").await;
    let form = create_form(&app.app, &token, workspace["id"].as_str().unwrap(), "RSVP").await;
    let form_id = form["id"].as_str().unwrap();

    let name = add_field(&app.app, &token, form_id, "Name").await;
    assert_eq!(name["fieldConfiguration"]["inputType"], "text");
    let email = add_field(&app.app, &token, form_id, "Email").await;
    assert!(email["position"].as_u64().unwrap() > name["position"].as_u64().unwrap());

    let (status, body) = call(
        &app.app,
        Method::POST,
        &format!("/api/forms/{form_id}/fields"),
        Some(json!({ "fieldName": "email", "fieldDescription": "again" })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_json_error(&body, "FIELD_NAME_EXISTS");

    let email_id = email["id"].as_str().unwrap();
    let (status, body) = call(
        &app.app,
        Method::PATCH,
        &format!("/api/forms/{form_id}/fields/{email_id}"),
        Some(json!({
            "fieldName": "Attending",
            "fieldConfiguration": {
                "inputType": "multipleChoice",
                "inputConfiguration": {
                    "options": [
                        { "optionName": "Yes", "value": "yes" },
                        { "optionName": "No", "value": "no" }
                    ],
                    "allowMultiple": false
                }
            }
        })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["fieldName"], "Attending");
    assert_eq!(body["data"]["fieldConfiguration"]["inputType"], "multipleChoice");

    let (status, _) = call(
        &app.app,
        Method::DELETE,
        &format!("/api/forms/{form_id}/fields/{email_id}"),
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = call(
        &app.app,
        Method::GET,
        &format!("/api/forms/{form_id}"),
        None,
        Some(&token),
    )
    .await;
    let fields = body["data"]["formFields"].as_array().unwrap();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0]["fieldName"], "Name");
}

#[tokio::test]
async fn it_form_field_rejects_empty_text() {
    let app = spawn_test_server().await;
    let token = login_and_get_token(&app.app).await;
    let form_id = ready_form(&app.app, &token, false).await;

    let (status, body) = call(
        &app.app,
        Method::POST,
        &format!("/api/forms/{form_id}/fields"),
        Some(json!({ "fieldName": " ", "fieldDescription": "desc" })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "FIELD_INVALID_PAYLOAD");
}

#[tokio::test]
async fn it_form_generate_field_suggestion() {
    let app = spawn_test_server().await;
    let token = login_and_get_token(&app.app).await;
    let form_id = ready_form(&app.app, &token, false).await;

    let (status, body) = call(
        &app.app,
        Method::POST,
        &format!("/api/forms/{form_id}/fields/generate"),
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["fieldName"], "Phone Number");
    assert!(body["data"]["fieldDescription"].is_string());
}

#[tokio::test]
async fn it_form_generate_field_needs_overview() {
    let app = spawn_test_server().await;
    let token = login_and_get_token(&app.app).await;
    let workspace = create_workspace(&app.app, &token, "Events").await;
    let form = create_form(&app.app, &token, workspace["id"].as_str().unwrap(), "").await;
    let form_id = form["id"].as_str().unwrap();

    let (status, body) = call(
        &app.app,
        Method::POST,
        &format!("/api/forms/{form_id}/fields/generate"),
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "FORM_NOT_READY");
}

#[tokio::test]
async fn it_form_conversations_are_listed_and_paginated() {
    let app = spawn_test_server().await;
    let token = login_and_get_token(&app.app).await;
    let form_id = ready_form(&app.app, &token, true).await;

    for _ in 0..3 {
        let (status, _) = turn(&app.app, &form_id, json!({ "messages": [] }), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = call(
        &app.app,
        Method::GET,
        &format!("/api/forms/{form_id}/conversations?limit=2&offset=0"),
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["limit"], 2);
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["messageCount"], 1);

    let conversation_id = items[0]["id"].as_str().unwrap();
    let (status, body) = call(
        &app.app,
        Method::GET,
        &format!("/api/forms/{form_id}/conversations/{conversation_id}"),
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["transcript"][0]["role"], "assistant");

    let (status, body) = call(
        &app.app,
        Method::GET,
        &format!("/api/forms/{form_id}/conversations?limit=1000"),
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["limit"], 100);
}

#[tokio::test]
async fn it_form_delete_releases_submissions() {
    let app = spawn_test_server().await;
    let token = login_and_get_token(&app.app).await;
    let form_id = ready_form(&app.app, &token, true).await;

    turn(&app.app, &form_id, json!({ "messages": [] }), None).await;
    let (_, me) = call(&app.app, Method::GET, "/api/users/me", None, Some(&token)).await;
    assert_eq!(me["data"]["organization"]["submissionCount"], 1);

    let (status, _) = call(
        &app.app,
        Method::DELETE,
        &format!("/api/forms/{form_id}"),
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, me) = call(&app.app, Method::GET, "/api/users/me", None, Some(&token)).await;
    assert_eq!(me["data"]["organization"]["submissionCount"], 0);
}

#[tokio::test]
async fn it_form_publish_toggle_controls_public_access() {
    let app = spawn_test_server().await;
    let token = login_and_get_token(&app.app).await;
    let form_id = ready_form(&app.app, &token, false).await;
    let public = format!("/api/form/{form_id}");

    let (status, _) = call(&app.app, Method::GET, &public, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(
        &app.app,
        Method::PATCH,
        &format!("/api/forms/{form_id}/publish"),
        Some(json!({ "isPublished": true })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isPublished"], true);

    let (status, body) = call(&app.app, Method::GET, &public, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["fieldCount"], 2);
    let (status, _) = turn(&app.app, &form_id, json!({ "messages": [] }), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &app.app,
        Method::PATCH,
        &format!("/api/forms/{form_id}/publish"),
        Some(json!({ "isPublished": false })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isPublished"], false);

    let (status, _) = call(&app.app, Method::GET, &public, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = turn(&app.app, &form_id, json!({ "messages": [] }), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_json_error(&body, "FORM_NOT_PUBLISHED");

    // 其他组织不能切换
    let stranger = login_and_get_token(&app.app).await;
    let (status, _) = call(
        &app.app,
        Method::PATCH,
        &format!("/api/forms/{form_id}/publish"),
        Some(json!({ "isPublished": true })),
        Some(&stranger),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn it_form_concurrent_fields_cannot_share_a_name() {
    let app = spawn_test_server().await;
    let token = login_and_get_token(&app.app).await;
    let workspace = create_workspace(&app.app, &token, "Events").await;
    let form = create_form(&app.app, &token, workspace["id"].as_str().unwrap(), "RSVP").await;
    let form_id = form["id"].as_str().unwrap();
    let path = format!("/api/forms/{form_id}/fields");

    let (a, b) = tokio::join!(
        call(
            &app.app,
            Method::POST,
            &path,
            Some(json!({ "fieldName": "Phone", "fieldDescription": "Mobile number" })),
            Some(&token),
        ),
        call(
            &app.app,
            Method::POST,
            &path,
            Some(json!({ "fieldName": "phone", "fieldDescription": "Landline" })),
            Some(&token),
        ),
    );
    let mut statuses = vec![a.0, b.0];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::CREATED, StatusCode::CONFLICT]);

    let detail = format!("/api/forms/{form_id}");
    let (_, body) = call(&app.app, Method::GET, &detail, None, Some(&token)).await;
    assert_eq!(body["data"]["formFields"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn it_form_field_rename_onto_taken_name_is_409() {
    let app = spawn_test_server().await;
    let token = login_and_get_token(&app.app).await;
    let workspace = create_workspace(&app.app, &token, "Events").await;
    let form = create_form(&app.app, &token, workspace["id"].as_str().unwrap(), "RSVP").await;
    let form_id = form["id"].as_str().unwrap();
    add_field(&app.app, &token, form_id, "Name").await;
    let email = add_field(&app.app, &token, form_id, "Email").await;
    let email_id = email["id"].as_str().unwrap();

    let (status, body) = call(
        &app.app,
        Method::PATCH,
        &format!("/api/forms/{form_id}/fields/{email_id}"),
        Some(json!({ "fieldName": "NAME" })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_json_error(&body, "FIELD_NAME_EXISTS");

    // Renaming the field to a new casing of its own name is allowed.
    let (status, body) = call(
        &app.app,
        Method::PATCH,
        &format!("/api/forms/{form_id}/fields/{email_id}"),
        Some(json!({ "fieldName": "EMAIL" })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["fieldName"], "EMAIL");
}
