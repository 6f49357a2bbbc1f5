use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::constants::{
    DEFAULT_FORM_NAME, DEFAULT_PAGE_SIZE, DEFAULT_WELCOME_CTA, DEFAULT_WELCOME_MESSAGE,
    DEFAULT_WELCOME_TITLE, MAX_PAGE_SIZE,
};
use crate::extractors::{JsonBody, QueryParams};
use crate::response::{created, ok, paginated, AppError};
use crate::routes::workspaces::owned_workspace;
use crate::services::system_prompt::{FormSchemaSystemPrompt, SystemPromptService};
use crate::state::AppState;
use crate::store::operations::conversations::Conversation;
use crate::store::operations::form_fields::{FieldConfiguration, FormField};
use crate::store::operations::forms::Form;
use crate::store::StoreError;
use crate::validation::{
    validate_field_configuration, validate_field_text, validate_name, validate_overview,
    validate_welcome_text,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_form))
        .route("/:id", get(get_form).patch(update_form).delete(delete_form))
        .route("/:id/publish", patch(set_published))
        .route("/:id/fields", post(create_field))
        .route("/:id/fields/generate", post(generate_field))
        .route(
            "/:id/fields/:field_id",
            patch(update_field).delete(delete_field),
        )
        .route("/:id/conversations", get(list_conversations))
        .route("/:id/conversations/:conversation_id", get(get_conversation))
}

/// Form owned by the caller's organization; foreign forms are reported as missing.
pub(crate) fn owned_form(state: &AppState, auth: &AuthUser, form_id: &str) -> Result<Form, AppError> {
    state
        .store()
        .get_form(form_id)?
        .filter(|f| f.organization_id == auth.organization_id)
        .ok_or_else(|| AppError::not_found("Form not found"))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FormDetail {
    #[serde(flatten)]
    form: Form,
    form_fields: Vec<FormField>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateFormRequest {
    workspace_id: String,
    name: Option<String>,
    overview: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateFormRequest {
    name: Option<String>,
    overview: Option<String>,
    welcome_screen_title: Option<String>,
    welcome_screen_message: Option<String>,
    welcome_screen_cta_label: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishRequest {
    is_published: bool,
}

fn invalid_form(msg: String) -> AppError {
    AppError::bad_request("FORM_INVALID_PAYLOAD", &msg)
}

async fn create_form(
    auth: AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateFormRequest>,
) -> Result<impl IntoResponse, AppError> {
    let workspace = owned_workspace(&state, &auth, &req.workspace_id)?;
    let name = validate_name(req.name.as_deref().unwrap_or(DEFAULT_FORM_NAME)).map_err(invalid_form)?;
    let overview = validate_overview(req.overview.as_deref().unwrap_or("")).map_err(invalid_form)?;

    let now = Utc::now();
    let form = Form {
        id: uuid::Uuid::new_v4().to_string(),
        organization_id: auth.organization_id.clone(),
        workspace_id: workspace.id,
        name,
        overview,
        welcome_screen_title: DEFAULT_WELCOME_TITLE.to_string(),
        welcome_screen_message: DEFAULT_WELCOME_MESSAGE.to_string(),
        welcome_screen_cta_label: DEFAULT_WELCOME_CTA.to_string(),
        is_published: false,
        created_at: now,
        updated_at: now,
    };
    state.store().upsert_form(&form)?;
    tracing::info!(form_id = %form.id, workspace_id = %form.workspace_id, "Form created");

    Ok(created(FormDetail {
        form,
        form_fields: Vec::new(),
    }))
}

async fn get_form(
    auth: AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let form = owned_form(&state, &auth, &id)?;
    let form_fields = state.store().list_form_fields(&form.id)?;
    Ok(ok(FormDetail { form, form_fields }))
}

async fn update_form(
    auth: AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<UpdateFormRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut form = owned_form(&state, &auth, &id)?;

    if let Some(name) = req.name {
        form.name = validate_name(&name).map_err(invalid_form)?;
    }
    if let Some(overview) = req.overview {
        form.overview = validate_overview(&overview).map_err(invalid_form)?;
    }
    if let Some(title) = req.welcome_screen_title {
        form.welcome_screen_title =
            validate_welcome_text(&title, "welcomeScreenTitle").map_err(invalid_form)?;
    }
    if let Some(message) = req.welcome_screen_message {
        form.welcome_screen_message =
            validate_welcome_text(&message, "welcomeScreenMessage").map_err(invalid_form)?;
    }
    if let Some(label) = req.welcome_screen_cta_label {
        form.welcome_screen_cta_label =
            validate_welcome_text(&label, "welcomeScreenCtaLabel").map_err(invalid_form)?;
    }
    form.updated_at = Utc::now();
    state.store().upsert_form(&form)?;

    let form_fields = state.store().list_form_fields(&form.id)?;
    Ok(ok(FormDetail { form, form_fields }))
}

async fn set_published(
    auth: AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<PublishRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut form = owned_form(&state, &auth, &id)?;
    form.is_published = req.is_published;
    form.updated_at = Utc::now();
    state.store().upsert_form(&form)?;
    tracing::info!(form_id = %form.id, is_published = form.is_published, "Form publication changed");
    Ok(ok(form))
}

async fn delete_form(
    auth: AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    owned_form(&state, &auth, &id)?;
    state.store().delete_form(&id)?;
    Ok(ok(serde_json::json!({ "deleted": true, "id": id })))
}

// ── Fields ──

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateFieldRequest {
    field_name: String,
    field_description: String,
    #[serde(default)]
    field_configuration: FieldConfiguration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateFieldRequest {
    field_name: Option<String>,
    field_description: Option<String>,
    field_configuration: Option<FieldConfiguration>,
    position: Option<u32>,
}

fn invalid_field(msg: String) -> AppError {
    AppError::bad_request("FIELD_INVALID_PAYLOAD", &msg)
}

/// Field names key the collected data, so two fields of a form may not share one.
fn field_name_taken(err: StoreError) -> AppError {
    match err {
        StoreError::Conflict { ref entity, .. } if entity == "form_field_name" => {
            AppError::conflict(
                "FIELD_NAME_EXISTS",
                "A field with this name already exists on the form",
            )
        }
        other => other.into(),
    }
}

async fn create_field(
    auth: AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateFieldRequest>,
) -> Result<impl IntoResponse, AppError> {
    let form = owned_form(&state, &auth, &id)?;
    let field_name = validate_field_text(&req.field_name, "fieldName").map_err(invalid_field)?;
    let field_description =
        validate_field_text(&req.field_description, "fieldDescription").map_err(invalid_field)?;
    validate_field_configuration(&req.field_configuration).map_err(invalid_field)?;

    let now = Utc::now();
    let field = FormField {
        id: uuid::Uuid::new_v4().to_string(),
        form_id: form.id.clone(),
        field_name,
        field_description,
        field_configuration: req.field_configuration,
        position: state.store().next_field_position(&form.id)?,
        created_at: now,
        updated_at: now,
    };
    state
        .store()
        .create_form_field(&field)
        .map_err(field_name_taken)?;
    Ok(created(field))
}

async fn update_field(
    auth: AuthUser,
    Path((id, field_id)): Path<(String, String)>,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<UpdateFieldRequest>,
) -> Result<impl IntoResponse, AppError> {
    let form = owned_form(&state, &auth, &id)?;
    let previous = state
        .store()
        .get_form_field(&form.id, &field_id)?
        .ok_or_else(|| AppError::not_found("Form field not found"))?;
    let mut field = previous.clone();

    if let Some(name) = req.field_name {
        field.field_name = validate_field_text(&name, "fieldName").map_err(invalid_field)?;
    }
    if let Some(description) = req.field_description {
        field.field_description =
            validate_field_text(&description, "fieldDescription").map_err(invalid_field)?;
    }
    if let Some(configuration) = req.field_configuration {
        validate_field_configuration(&configuration).map_err(invalid_field)?;
        field.field_configuration = configuration;
    }
    if let Some(position) = req.position {
        field.position = position;
    }
    field.updated_at = Utc::now();
    state
        .store()
        .update_form_field(&previous, &field)
        .map_err(field_name_taken)?;
    Ok(ok(field))
}

async fn delete_field(
    auth: AuthUser,
    Path((id, field_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let form = owned_form(&state, &auth, &id)?;
    state.store().delete_form_field(&form.id, &field_id)?;
    Ok(ok(serde_json::json!({ "deleted": true, "id": field_id })))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldSuggestion {
    field_name: String,
    #[serde(default)]
    field_description: String,
}

/// Pull the JSON object out of a model answer that may wrap it in prose or code fences.
fn parse_field_suggestion(answer: &str) -> Option<FieldSuggestion> {
    let start = answer.find('{')?;
    let end = answer.rfind('}')?;
    if end < start {
        return None;
    }
    let suggestion: FieldSuggestion = serde_json::from_str(&answer[start..=end]).ok()?;
    let field_name = suggestion.field_name.trim().to_string();
    if field_name.is_empty() {
        return None;
    }
    Some(FieldSuggestion {
        field_name,
        field_description: suggestion.field_description.trim().to_string(),
    })
}

async fn generate_field(
    auth: AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let form = owned_form(&state, &auth, &id)?;
    let fields = state.store().list_form_fields(&form.id)?;
    let schema = FormSchemaSystemPrompt::for_field_suggestion(&form.overview, fields)
        .map_err(|e| AppError::bad_request("FORM_NOT_READY", &e.to_string()))?;

    let prompt = SystemPromptService::new().get_generate_form_field_prompt_message(&schema);
    let answer = state.llm().chat(vec![prompt]).await?;

    let suggestion = parse_field_suggestion(&answer).ok_or_else(|| {
        tracing::error!(form_id = %form.id, "Field suggestion is not valid JSON");
        AppError::bad_gateway(
            "LLM_INVALID_OUTPUT",
            "The language model returned an unusable answer",
        )
    })?;
    Ok(ok(suggestion))
}

// ── Conversations ──

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListConversationsQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConversationSummary {
    id: String,
    name: String,
    is_finished: bool,
    message_count: usize,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&Conversation> for ConversationSummary {
    fn from(c: &Conversation) -> Self {
        Self {
            id: c.id.clone(),
            name: c.name.clone(),
            is_finished: c.is_finished,
            message_count: c.transcript.len(),
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

async fn list_conversations(
    auth: AuthUser,
    Path(id): Path<String>,
    QueryParams(query): QueryParams<ListConversationsQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let form = owned_form(&state, &auth, &id)?;
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);

    let (conversations, total) = state.store().list_conversations(&form.id, limit, offset)?;
    let items: Vec<ConversationSummary> =
        conversations.iter().map(ConversationSummary::from).collect();
    Ok(paginated(items, total, limit, offset))
}

async fn get_conversation(
    auth: AuthUser,
    Path((id, conversation_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let form = owned_form(&state, &auth, &id)?;
    let conversation = state
        .store()
        .get_conversation(&form.id, &conversation_id)?
        .ok_or_else(|| AppError::not_found("Conversation not found"))?;
    Ok(ok(conversation))
}
