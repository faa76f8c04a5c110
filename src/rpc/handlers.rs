use super::types::*;
use crate::account::RegistrationError;
use crate::rpc::RpcState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::debug;

/// Handle `POST /signup`.
///
/// Body rejections (bad JSON, wrong field types, wrong content type) get the
/// same 400 as missing fields.
pub async fn handle_signup(
    State(state): State<RpcState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!(reason = %rejection.body_text(), "Rejected signup body");
            return RegistrationError::InvalidInput("body").into_response();
        }
    };

    match state.registration.register(request.into_registration()).await {
        Ok(user_id) => (
            StatusCode::CREATED,
            Json(SignupResponse {
                message: MSG_CREATED.to_string(),
                user_id,
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

/// Handle `GET /health`
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

impl IntoResponse for RegistrationError {
    fn into_response(self) -> Response {
        // Internal causes were logged where they happened; callers only see
        // the fixed message.
        let (status, message) = match self {
            RegistrationError::InvalidInput(_) => (StatusCode::BAD_REQUEST, MSG_INVALID_INPUT),
            RegistrationError::DuplicateAccount(_) => (StatusCode::CONFLICT, MSG_DUPLICATE),
            RegistrationError::StorageUnavailable(_) | RegistrationError::HashingFailure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, MSG_INTERNAL)
            }
        };
        (status, Json(MessageResponse::new(message))).into_response()
    }
}
