//! Registration, deactivation requests and password reset requests.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::router::{BasicAuth, Valid};
use crate::user::{Registration, UserView};
use crate::{AppState, ServerError};

#[derive(Debug, Default, Validate, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    pub referral_partner: Option<String>,
    pub email: String,
    #[validate(length(min = 1, message = "Password must not be empty."))]
    pub password: String,
    pub pubkey: Option<String>,
}

/// `POST /users`.
pub async fn create(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<StatusCode, ServerError> {
    state
        .users
        .register(Registration {
            email: body.email,
            password: body.password,
            public_key: body.pubkey,
            referral_partner: body.referral_partner,
        })
        .await?;

    Ok(StatusCode::CREATED)
}

/// `DELETE /users/{id}`.
pub async fn deactivate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    BasicAuth(credentials): BasicAuth,
) -> Result<Json<UserView>, ServerError> {
    let view = state.users.deactivate(&id, &credentials).await?;
    Ok(Json(view))
}

/// `PATCH /users/{id}`.
pub async fn reset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserView>, ServerError> {
    let view = state.users.request_password_reset(&id).await?;
    Ok(Json(view))
}
