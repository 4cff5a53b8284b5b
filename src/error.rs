use axum::{
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;

use crate::notice::Notice;

pub type AppResult<T> = Result<T, AppError>;

const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong, please try again.";

/// Failure classes a visitor can be told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error("validation_error")]
    Validation,
    #[error("invalid_credentials")]
    InvalidCredentials,
    #[error("duplicate_email")]
    DuplicateEmail,
    #[error("duplicate_application")]
    DuplicateApplication,
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("wrong_role")]
    WrongRole,
    #[error("unauthorized")]
    Unauthorized,
    #[error("not_found_or_unauthorized")]
    NotFoundOrUnauthorized,
    #[error("not_found")]
    NotFound,
    #[error("missing_resume")]
    MissingResume,
    #[error("artifact_not_found")]
    ArtifactNotFound,
    #[error("store_error")]
    Store,
}

impl ErrorKind {
    pub fn code(self) -> String {
        self.to_string()
    }

    pub fn parse(code: &str) -> Option<Self> {
        const ALL: [ErrorKind; 12] = [
            ErrorKind::Validation,
            ErrorKind::InvalidCredentials,
            ErrorKind::DuplicateEmail,
            ErrorKind::DuplicateApplication,
            ErrorKind::Unauthenticated,
            ErrorKind::WrongRole,
            ErrorKind::Unauthorized,
            ErrorKind::NotFoundOrUnauthorized,
            ErrorKind::NotFound,
            ErrorKind::MissingResume,
            ErrorKind::ArtifactNotFound,
            ErrorKind::Store,
        ];
        ALL.into_iter().find(|kind| kind.code() == code)
    }

    fn status(self) -> StatusCode {
        match self {
            ErrorKind::Validation | ErrorKind::MissingResume => StatusCode::BAD_REQUEST,
            ErrorKind::InvalidCredentials | ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::WrongRole | ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
            ErrorKind::DuplicateEmail | ErrorKind::DuplicateApplication => StatusCode::CONFLICT,
            ErrorKind::NotFoundOrUnauthorized
            | ErrorKind::NotFound
            | ErrorKind::ArtifactNotFound => StatusCode::NOT_FOUND,
            ErrorKind::Store => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    kind: ErrorKind,
    message: String,
    expose_message: bool,
    redirect_to: Option<String>,
    cookies: Vec<HeaderValue>,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: kind.status(),
            kind,
            message: message.into(),
            expose_message: true,
            redirect_to: None,
            cookies: Vec::new(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn unauthenticated() -> Self {
        Self::new(ErrorKind::Unauthenticated, "please log in first")
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorKind::Unauthorized, "unauthorized")
    }

    pub fn not_found() -> Self {
        Self::new(ErrorKind::NotFound, "resource not found")
    }

    pub fn not_found_or_unauthorized() -> Self {
        Self::new(
            ErrorKind::NotFoundOrUnauthorized,
            "job not found or unauthorized",
        )
    }

    /// A store failure whose details stay in the log.
    pub fn internal<E: Display>(error: E) -> Self {
        Self {
            expose_message: false,
            ..Self::new(ErrorKind::Store, error.to_string())
        }
    }

    /// Turns the error into a redirect that carries the message as a notice.
    pub fn redirect_to(mut self, location: impl Into<String>) -> Self {
        self.redirect_to = Some(location.into());
        self
    }

    /// Extra `Set-Cookie` value sent along with the error.
    pub fn with_cookie(mut self, cookie: HeaderValue) -> Self {
        self.cookies.push(cookie);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn location(&self) -> Option<&str> {
        self.redirect_to.as_deref()
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.kind == ErrorKind::Store {
            tracing::error!(error = %self.message, "request failed with store error");
        }

        let message = if self.expose_message {
            self.message
        } else {
            GENERIC_FAILURE_MESSAGE.to_string()
        };

        let mut headers = HeaderMap::new();
        for cookie in self.cookies {
            headers.append(SET_COOKIE, cookie);
        }

        if let Some(location) = self.redirect_to {
            let notice = Notice::error(self.kind, message);
            headers.append(SET_COOKIE, notice.to_cookie());
            return (headers, Redirect::to(&location)).into_response();
        }

        let body = Json(ErrorResponse {
            error: message,
            code: self.kind.code(),
        });
        (self.status, headers, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

impl From<diesel::result::Error> for AppError {
    fn from(value: diesel::result::Error) -> Self {
        match value {
            diesel::result::Error::NotFound => AppError::not_found(),
            _ => AppError::internal(value),
        }
    }
}

impl From<diesel::r2d2::PoolError> for AppError {
    fn from(value: diesel::r2d2::PoolError) -> Self {
        AppError::internal(format!("database pool error: {value}"))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        AppError::internal(value)
    }
}
