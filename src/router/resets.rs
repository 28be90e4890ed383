//! Password reset confirmation.

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::router::Valid;
use crate::user::UserView;
use crate::{AppState, ServerError};

#[derive(Debug, Default, Validate, Serialize, Deserialize)]
pub struct Body {
    #[validate(length(min = 1, message = "Password must not be empty."))]
    pub password: String,
}

/// `POST /resets/{token}`.
pub async fn confirm(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Valid(body): Valid<Body>,
) -> Result<Json<UserView>, ServerError> {
    let view = state
        .users
        .confirm_password_reset(&token, &body.password)
        .await?;
    Ok(Json(view))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use super::*;
    use crate::crypto::digest;
    use crate::router::tests::state;
    use crate::user::{CredentialStore, User};
    use crate::{app, make_request};

    #[tokio::test]
    async fn test_confirm_handler() {
        let (state, store) = state();
        let app = app(state);
        store
            .create_user(User {
                id: "test@storj.io".into(),
                hashpass: digest("old"),
                resetter: Some("reset-token".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let response = make_request(
            app.clone(),
            Method::POST,
            "/resets/reset-token",
            json!({ "password": "" }).to_string(),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = make_request(
            app.clone(),
            Method::POST,
            "/resets/reset-token",
            json!({ "password": "password" }).to_string(),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let user = store.get_user("test@storj.io").await.unwrap();
        assert_eq!(
            user.hashpass,
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
        assert_eq!(user.resetter, None);

        let response = make_request(
            app,
            Method::POST,
            "/resets/reset-token",
            json!({ "password": "password" }).to_string(),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
