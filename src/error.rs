//! Error handler for bridge.

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::user::StoreError;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error("identifier must be a valid email address")]
    InvalidIdentifier,

    #[error("missing public key")]
    MissingPublicKey,

    #[error("user is already activated")]
    AlreadyActive,

    #[error("credentials do not match the targeted user")]
    AuthorizationMismatch,

    #[error("missing or invalid 'Authorization' header")]
    MissingCredentials,

    #[error("user already exists")]
    Conflict,

    /// Lookup miss inside a confirmation or update flow.
    ///
    /// Answered with a 500, only reactivation exposes a 404.
    #[error("no user matches the request")]
    NotFound,

    #[error("user not found")]
    UnknownUser,

    #[error("credential store failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidIdentifier => ServerError::InvalidIdentifier,
            StoreError::NotFound => ServerError::NotFound,
            StoreError::Conflict => ServerError::Conflict,
            err => ServerError::Store(err),
        }
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(
        self,
    ) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
            errors: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue.to_string(),
            })
        })
        .collect()
}

impl ServerError {
    /// HTTP status code sent for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Validation(_)
            | ServerError::Axum(_)
            | ServerError::InvalidIdentifier
            | ServerError::MissingPublicKey
            | ServerError::AlreadyActive
            | ServerError::AuthorizationMismatch
            | ServerError::MissingCredentials => StatusCode::BAD_REQUEST,
            ServerError::Conflict => StatusCode::CONFLICT,
            ServerError::UnknownUser => StatusCode::NOT_FOUND,
            ServerError::NotFound | ServerError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let response = ResponseError::default()
            .title("There were validation errors with your request.")
            .details(&self.to_string())
            .status(status);

        let response = match &self {
            ServerError::Validation(validation_errors) => {
                response.errors(validation_errors)
            },

            ServerError::Axum(rejection) => response
                .title("Request body could not be parsed.")
                .details(&rejection.body_text()),

            ServerError::InvalidIdentifier => {
                response.title("Invalid email address.")
            },

            ServerError::MissingPublicKey => {
                response.title("Public key is required.")
            },

            ServerError::AlreadyActive => {
                response.title("User is already activated.")
            },

            ServerError::AuthorizationMismatch
            | ServerError::MissingCredentials => {
                response.title("Authorization failed.")
            },

            ServerError::Conflict => {
                response.title("Resource already exists.")
            },

            ServerError::UnknownUser => response.title("Resource not found."),

            ServerError::NotFound => {
                tracing::error!(err = %self, "lookup failed");

                ResponseError::default().details(&self.to_string())
            },

            ServerError::Store(err) => {
                tracing::error!(%err, "server returned 500 status");

                ResponseError::default()
            },

            _ => response,
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}
