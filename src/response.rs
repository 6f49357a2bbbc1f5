use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T: Serialize> {
    pub items: Vec<T>,
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub trace_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub is_operational: bool,
}

impl AppError {
    fn operational(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.to_string(),
            is_operational: true,
        }
    }

    pub fn bad_request(code: &str, message: &str) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn unauthorized(message: &str) -> Self {
        Self::operational(StatusCode::UNAUTHORIZED, "AUTH_UNAUTHORIZED", message)
    }

    /// 403 with a caller-visible code, e.g. plan limits.
    pub fn forbidden_with_code(code: &str, message: &str) -> Self {
        Self::operational(StatusCode::FORBIDDEN, code, message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::operational(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn conflict(code: &str, message: &str) -> Self {
        Self::operational(StatusCode::CONFLICT, code, message)
    }

    pub fn too_many_requests(message: &str) -> Self {
        Self::operational(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", message)
    }

    /// The completion service answered, but with something we cannot use.
    pub fn bad_gateway(code: &str, message: &str) -> Self {
        Self::operational(StatusCode::BAD_GATEWAY, code, message)
    }

    pub fn service_unavailable(code: &str, message: &str) -> Self {
        Self::operational(StatusCode::SERVICE_UNAVAILABLE, code, message)
    }

    pub fn gateway_timeout(message: &str) -> Self {
        Self::operational(StatusCode::GATEWAY_TIMEOUT, "LLM_TIMEOUT", message)
    }

    pub fn internal(message: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.to_string(),
            is_operational: false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let exposed_message = if self.is_operational {
            self.message.clone()
        } else {
            "Internal server error".to_string()
        };

        if self.is_operational {
            tracing::warn!(status = %self.status, code = %self.code, error = %self.message, "API error");
        } else {
            tracing::error!(status = %self.status, code = %self.code, error = %self.message, "Internal API error");
        }

        (
            self.status,
            Json(ErrorBody {
                success: false,
                code: self.code,
                message: exposed_message,
                trace_id: None,
            }),
        )
            .into_response()
    }
}

// StoreError 映射：Validation -> 400，NotFound -> 404，Conflict -> 409，LimitReached -> 403，其余 -> 500（消息脱敏）
impl From<crate::store::StoreError> for AppError {
    fn from(value: crate::store::StoreError) -> Self {
        use crate::store::StoreError;

        match &value {
            StoreError::Validation(msg) => AppError::bad_request("VALIDATION_ERROR", msg),
            StoreError::NotFound { entity, .. } => {
                AppError::not_found(&format!("{entity} not found"))
            }
            StoreError::Conflict { entity, .. } => {
                AppError::conflict("CONFLICT", &format!("{entity} already exists"))
            }
            StoreError::LimitReached { .. } => AppError::forbidden_with_code(
                "SUBMISSION_LIMIT_REACHED",
                "This form has reached its total submissions limit",
            ),
            _ => AppError::internal(&value.to_string()),
        }
    }
}

impl From<crate::services::llm_provider::LlmError> for AppError {
    fn from(value: crate::services::llm_provider::LlmError) -> Self {
        use crate::services::llm_provider::LlmError;

        match &value {
            LlmError::Disabled => AppError::service_unavailable(
                "LLM_DISABLED",
                "Conversations are temporarily unavailable",
            ),
            LlmError::Timeout => AppError::gateway_timeout("The language model took too long to answer"),
            LlmError::Network(_) | LlmError::ApiError { .. } | LlmError::InvalidResponse(_) => {
                tracing::error!(error = %value, "Completion request failed");
                AppError::bad_gateway("LLM_UPSTREAM_ERROR", "The language model request failed")
            }
        }
    }
}

impl From<crate::services::conversation::ConversationError> for AppError {
    fn from(value: crate::services::conversation::ConversationError) -> Self {
        use crate::services::conversation::ConversationError;

        match value {
            ConversationError::InvalidPayload(msg) => {
                AppError::bad_request("INVALID_CONVERSATION", &msg)
            }
            ConversationError::FormNotReady(e) => {
                AppError::bad_request("FORM_NOT_READY", &e.to_string())
            }
            ConversationError::NotFound => AppError::not_found("Conversation not found"),
            ConversationError::Finished => AppError::conflict(
                "CONVERSATION_FINISHED",
                "This conversation is already finished",
            ),
            ConversationError::InvalidOutput(msg) => {
                tracing::error!(error = %msg, "Unusable completion output");
                AppError::bad_gateway(
                    "LLM_INVALID_OUTPUT",
                    "The language model returned an unusable answer",
                )
            }
            ConversationError::Llm(e) => e.into(),
            ConversationError::Store(e) => e.into(),
        }
    }
}

pub fn ok<T: Serialize>(data: T) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            data,
        }),
    )
}

pub fn created<T: Serialize>(data: T) -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(ApiResponse {
            success: true,
            data,
        }),
    )
}

pub fn paginated<T: Serialize>(
    items: Vec<T>,
    total: u64,
    limit: usize,
    offset: usize,
) -> impl IntoResponse {
    ok(PaginatedResponse {
        items,
        total,
        limit,
        offset,
    })
}
