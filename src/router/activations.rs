//! Account activation.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::router::Valid;
use crate::user::UserView;
use crate::{AppState, ServerError};

#[derive(Debug, Default, Validate, Serialize, Deserialize)]
pub struct Body {
    #[validate(length(min = 1, message = "Email must not be empty."))]
    pub email: String,
}

/// `POST /activations`, send the activation mail again.
pub async fn create(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<UserView>), ServerError> {
    let view = state.users.reactivate(&body.email).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// `GET /activations/{token}`.
pub async fn confirm(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<UserView>, ServerError> {
    let view = state.users.confirm_activation(&token).await?;
    Ok(Json(view))
}
