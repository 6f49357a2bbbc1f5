use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::constants::DEFAULT_WORKSPACE_NAME;
use crate::extractors::JsonBody;
use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::operations::workspaces::Workspace;
use crate::validation::validate_name;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_workspaces).post(create_workspace))
        .route(
            "/:id",
            get(get_workspace)
                .patch(update_workspace)
                .delete(delete_workspace),
        )
        .route("/:id/forms", get(list_workspace_forms))
}

/// Workspace owned by the caller's organization; anything else is reported as missing.
pub(crate) fn owned_workspace(
    state: &AppState,
    auth: &AuthUser,
    workspace_id: &str,
) -> Result<Workspace, AppError> {
    state
        .store()
        .get_workspace(workspace_id)?
        .filter(|w| w.organization_id == auth.organization_id)
        .ok_or_else(|| AppError::not_found("Workspace not found"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateWorkspaceRequest {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateWorkspaceRequest {
    name: String,
}

async fn list_workspaces(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let workspaces = state.store().list_workspaces(&auth.organization_id)?;
    Ok(ok(workspaces))
}

async fn create_workspace(
    auth: AuthUser,
    State(state): State<AppState>,
    body: Option<JsonBody<CreateWorkspaceRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let req = body.map(|JsonBody(req)| req).unwrap_or_default();
    let name = validate_name(req.name.as_deref().unwrap_or(DEFAULT_WORKSPACE_NAME))
        .map_err(|msg| AppError::bad_request("WORKSPACE_INVALID_NAME", &msg))?;

    let now = Utc::now();
    let workspace = Workspace {
        id: uuid::Uuid::new_v4().to_string(),
        organization_id: auth.organization_id.clone(),
        name,
        created_at: now,
        updated_at: now,
    };
    state.store().upsert_workspace(&workspace)?;
    tracing::info!(workspace_id = %workspace.id, organization_id = %auth.organization_id, "Workspace created");
    Ok(created(workspace))
}

async fn get_workspace(
    auth: AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(owned_workspace(&state, &auth, &id)?))
}

async fn update_workspace(
    auth: AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<UpdateWorkspaceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut workspace = owned_workspace(&state, &auth, &id)?;
    workspace.name = validate_name(&req.name)
        .map_err(|msg| AppError::bad_request("WORKSPACE_INVALID_NAME", &msg))?;
    workspace.updated_at = Utc::now();
    state.store().upsert_workspace(&workspace)?;
    Ok(ok(workspace))
}

async fn delete_workspace(
    auth: AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    owned_workspace(&state, &auth, &id)?;
    let forms_deleted = state.store().delete_workspace(&id)?;
    Ok(ok(serde_json::json!({
        "deleted": true,
        "id": id,
        "formsDeleted": forms_deleted,
    })))
}

async fn list_workspace_forms(
    auth: AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let workspace = owned_workspace(&state, &auth, &id)?;
    Ok(ok(state.store().list_forms_by_workspace(&workspace.id)?))
}
