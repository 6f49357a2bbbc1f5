use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::auth::AuthUser;
use crate::response::{ok, AppError};
use crate::routes::auth::UserProfile;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrganizationSummary {
    id: String,
    name: String,
    submission_count: u64,
    submission_limit: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MeResponse {
    user: UserProfile,
    organization: OrganizationSummary,
}

async fn get_me(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let store = state.store();
    let user = store
        .get_user_by_id(&auth.user_id)?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    let organization = store
        .get_organization(&auth.organization_id)?
        .ok_or_else(|| AppError::not_found("Organization not found"))?;

    Ok(ok(MeResponse {
        user: UserProfile::from(&user),
        organization: OrganizationSummary {
            submission_count: store.count_submissions(&organization.id)?,
            submission_limit: state.config().plan.submission_limit,
            id: organization.id,
            name: organization.name,
        },
    }))
}
