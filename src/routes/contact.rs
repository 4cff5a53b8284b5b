use axum::{
    extract::{Form, State},
    http::HeaderMap,
    response::Redirect,
};
use serde::Deserialize;
use tracing::info;

use super::auth::non_empty;
use crate::{
    contacts::Contacts,
    error::{AppError, AppResult, ErrorKind},
    notice::{redirect_with, Notice},
    state::AppState,
};

const CONTACT_RETURN_PATH: &str = "/";

#[derive(Debug, Default, Deserialize)]
pub struct ContactForm {
    pub name: Option<String>,
    pub email: Option<String>,
    pub message: Option<String>,
}

pub async fn submit(
    State(state): State<AppState>,
    Form(form): Form<ContactForm>,
) -> AppResult<(HeaderMap, Redirect)> {
    let (name, email, message) = match (
        non_empty(form.name),
        non_empty(form.email),
        non_empty(form.message),
    ) {
        (Some(name), Some(email), Some(message)) => (name, email, message),
        _ => {
            return Err(AppError::validation("All fields are required!")
                .redirect_to(CONTACT_RETURN_PATH))
        }
    };

    let mut conn = state
        .db()
        .map_err(|err| err.redirect_to(CONTACT_RETURN_PATH))?;
    let contact_id = Contacts::new(&mut conn)
        .submit(name, email, message)
        .ok_or_else(|| {
            AppError::new(ErrorKind::Store, "Failed to send your message!")
                .redirect_to(CONTACT_RETURN_PATH)
        })?;

    info!(contact_id = %contact_id, "contact inquiry stored");
    Ok(redirect_with(
        CONTACT_RETURN_PATH,
        Notice::success("Thanks for reaching out!"),
    ))
}
