//! Public endpoints used by people filling in a form.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;

use crate::auth::AuthUser;
use crate::constants::DEMO_FORM_ID;
use crate::extractors::JsonBody;
use crate::response::{ok, AppError};
use crate::services::conversation::{ConversationPayload, ConversationService};
use crate::services::llm_provider::LlmError;
use crate::state::AppState;
use crate::store::operations::forms::Form;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:form_id", get(get_public_form))
        .route("/:form_id/conversation", post(conversation_turn))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PublicForm {
    id: String,
    name: String,
    welcome_screen_title: String,
    welcome_screen_message: String,
    welcome_screen_cta_label: String,
    field_count: usize,
}

fn load_form(state: &AppState, form_id: &str) -> Result<Form, AppError> {
    state
        .store()
        .get_form(form_id)?
        .ok_or_else(|| AppError::not_found("Form not found"))
}

async fn get_public_form(
    Path(form_id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let form = load_form(&state, &form_id)?;
    if !form.is_published {
        return Err(AppError::not_found("Form not found"));
    }
    let field_count = state.store().list_form_fields(&form.id)?.len();

    Ok(ok(PublicForm {
        id: form.id,
        name: form.name,
        welcome_screen_title: form.welcome_screen_title,
        welcome_screen_message: form.welcome_screen_message,
        welcome_screen_cta_label: form.welcome_screen_cta_label,
        field_count,
    }))
}

/// One conversation turn.
///
/// Preview turns are only honoured for members of the form's organization; they
/// may target unpublished forms, are not stored and do not count against the plan.
async fn conversation_turn(
    auth: Option<AuthUser>,
    Path(form_id): Path<String>,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ConversationPayload>,
) -> Result<impl IntoResponse, AppError> {
    let form = load_form(&state, &form_id)?;
    let is_member = auth
        .as_ref()
        .is_some_and(|a| a.organization_id == form.organization_id);
    let is_preview = payload.is_preview && is_member;

    if !form.is_published && !is_preview {
        return Err(AppError::forbidden_with_code(
            "FORM_NOT_PUBLISHED",
            "This form is not accepting responses",
        ));
    }

    let fields = state.store().list_form_fields(&form.id)?;
    let limit = if form.id == DEMO_FORM_ID || is_preview {
        None
    } else {
        Some(state.config().plan.submission_limit)
    };
    let service = ConversationService::new(state.store(), state.llm(), form, fields, is_preview)?
        .with_submission_limit(limit);

    if !state.llm().is_enabled() {
        return Err(LlmError::Disabled.into());
    }

    let reply = service
        .get_next_question(payload.conversation_id.as_deref(), &payload.messages)
        .await?;
    Ok(ok(reply))
}
