use axum::{
    extract::{Form, State},
    http::{header::SET_COOKIE, HeaderMap},
    response::{IntoResponse, Redirect, Response},
};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, warn};

use super::FormPage;
use crate::{
    accounts::{Accounts, NewAccount},
    auth::{guard::LOGIN_PATH, password, CurrentSession, Role},
    error::{AppError, AppResult, ErrorKind},
    notice::{Notice, Page, PendingNotice},
    state::AppState,
};

const FREELANCER_REGISTER_PATH: &str = "/freelancers/register";
const EMPLOYER_REGISTER_PATH: &str = "/employers/register";

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterForm {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub company_name: Option<String>,
    pub date_of_birth: Option<String>,
}

pub async fn index(
    State(state): State<AppState>,
    CurrentSession(identity): CurrentSession,
    pending: PendingNotice,
) -> AppResult<Response> {
    if let Some(identity) = identity {
        let mut conn = state.db()?;
        let stored = Accounts::new(&mut conn)
            .stored_role(identity.user_id)?
            .and_then(|role| Role::parse(&role));
        if let Some(role) = stored {
            return Ok(Redirect::to(role.dashboard_path()).into_response());
        }
    }
    Ok(Page::new(pending, FormPage { page: "index" }).into_response())
}

pub async fn login_page(pending: PendingNotice) -> Page<FormPage> {
    Page::new(pending, FormPage { page: "login" })
}

pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> AppResult<(HeaderMap, Redirect)> {
    let (email, password) = match (non_empty(form.email), present(form.password)) {
        (Some(email), Some(password)) => (email.to_lowercase(), password),
        _ => {
            return Err(
                AppError::validation("Email and password are required!").redirect_to(LOGIN_PATH)
            )
        }
    };

    let invalid = || AppError::new(ErrorKind::InvalidCredentials, "Invalid email or password!");

    let mut conn = state.db().map_err(|err| err.redirect_to(LOGIN_PATH))?;
    let user = Accounts::new(&mut conn)
        .find_by_email(&email)
        .map_err(|err| AppError::from(err).redirect_to(LOGIN_PATH))?
        .ok_or_else(|| invalid().redirect_to(LOGIN_PATH))?;
    drop(conn);

    let valid = password::verify_password(&password, &user.password_hash).unwrap_or_else(|err| {
        warn!(user_id = %user.id, error = %err, "stored password hash is unreadable");
        false
    });
    if !valid {
        info!(user_id = %user.id, "login rejected");
        return Err(invalid().redirect_to(LOGIN_PATH));
    }

    let role = Role::parse(&user.role).ok_or_else(|| {
        AppError::internal(format!("user {} has unknown role {}", user.id, user.role))
            .redirect_to(LOGIN_PATH)
    })?;

    let cookie = state
        .sessions
        .establish(user.id, role)
        .map_err(|err| AppError::from(err).redirect_to(LOGIN_PATH))?;

    info!(user_id = %user.id, role = role.as_str(), "user logged in");

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);
    Ok((headers, Redirect::to(role.dashboard_path())))
}

pub async fn logout(State(state): State<AppState>) -> (HeaderMap, Redirect) {
    let mut headers = HeaderMap::new();
    headers.append(SET_COOKIE, state.sessions.terminate());
    headers.append(
        SET_COOKIE,
        Notice::success("You have been logged out.").to_cookie(),
    );
    (headers, Redirect::to(LOGIN_PATH))
}

pub async fn freelancer_register_page(pending: PendingNotice) -> Page<FormPage> {
    Page::new(pending, FormPage { page: "freelancers-register" })
}

pub async fn employer_register_page(pending: PendingNotice) -> Page<FormPage> {
    Page::new(pending, FormPage { page: "employers-register" })
}

pub async fn freelancer_register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> AppResult<(HeaderMap, Redirect)> {
    register(&state, form, Role::Freelancer)
        .await
        .map_err(|err| err.redirect_to(FREELANCER_REGISTER_PATH))
}

pub async fn employer_register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> AppResult<(HeaderMap, Redirect)> {
    register(&state, form, Role::Employer)
        .await
        .map_err(|err| err.redirect_to(EMPLOYER_REGISTER_PATH))
}

async fn register(
    state: &AppState,
    form: RegisterForm,
    role: Role,
) -> AppResult<(HeaderMap, Redirect)> {
    let (name, email, password) = match (
        non_empty(form.name),
        non_empty(form.email),
        present(form.password),
    ) {
        (Some(name), Some(email), Some(password)) => (name, email.to_lowercase(), password),
        _ => return Err(AppError::validation("All fields are required!")),
    };
    if !email.contains('@') {
        return Err(AppError::validation("Please enter a valid email address."));
    }

    let (company_name, date_of_birth) = match role {
        Role::Employer => {
            let company = non_empty(form.company_name)
                .ok_or_else(|| AppError::validation("Company name is required!"))?;
            let birth = non_empty(form.date_of_birth)
                .map(|raw| parse_date(&raw))
                .transpose()?;
            (Some(company), birth)
        }
        Role::Freelancer => (None, None),
    };

    let password_hash = password::hash_password(&password)?;

    let mut conn = state.db()?;
    let user_id = Accounts::new(&mut conn)
        .register(NewAccount {
            name,
            email,
            password_hash,
            role,
            company_name,
            date_of_birth,
        })?
        .ok_or_else(|| AppError::new(ErrorKind::DuplicateEmail, "Email already exists!"))?;
    drop(conn);

    info!(user_id = %user_id, role = role.as_str(), "account registered");

    let mut headers = HeaderMap::new();
    headers.append(SET_COOKIE, state.sessions.establish(user_id, role)?);
    headers.append(
        SET_COOKIE,
        Notice::success("Registration successful!").to_cookie(),
    );
    Ok((headers, Redirect::to(role.dashboard_path())))
}

fn parse_date(raw: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::validation("Date of birth must look like YYYY-MM-DD."))
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Like [`non_empty`] but keeps surrounding whitespace, for passwords.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
