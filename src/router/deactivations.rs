//! Deactivation confirmation.

use axum::Json;
use axum::extract::{Path, State};

use crate::user::UserView;
use crate::{AppState, ServerError};

/// `GET /deactivations/{token}`.
pub async fn confirm(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<UserView>, ServerError> {
    let view = state.users.confirm_deactivation(&token).await?;
    Ok(Json(view))
}
