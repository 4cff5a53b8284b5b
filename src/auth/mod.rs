pub mod guard;
pub mod password;
pub mod session;

use std::marker::PhantomData;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::Cookie;
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{accounts::Accounts, error::AppError, state::AppState};
use guard::{require_role, Access, DenyReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Freelancer,
    Employer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Freelancer => "freelancer",
            Role::Employer => "employer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "freelancer" => Some(Role::Freelancer),
            "employer" => Some(Role::Employer),
            _ => None,
        }
    }

    pub fn dashboard_path(self) -> &'static str {
        match self {
            Role::Freelancer => "/freelancers/dashboard",
            Role::Employer => "/employers/dashboard",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}

/// Whatever identity the session cookie carries, without any role check.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Option<Identity>);

#[async_trait]
impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let identity = TypedHeader::<Cookie>::from_request_parts(parts, state)
            .await
            .ok()
            .and_then(|TypedHeader(cookies)| state.sessions.authenticate(&cookies));
        Ok(CurrentSession(identity))
    }
}

pub trait RequiredRole: Send + Sync + 'static {
    const ROLE: Role;
}

#[derive(Debug)]
pub struct Employer;
#[derive(Debug)]
pub struct Freelancer;

impl RequiredRole for Employer {
    const ROLE: Role = Role::Employer;
}

impl RequiredRole for Freelancer {
    const ROLE: Role = Role::Freelancer;
}

/// A session that passed the guard for role `R`.
#[derive(Debug)]
pub struct Authorized<R> {
    pub identity: Identity,
    _role: PhantomData<R>,
}

impl<R> Authorized<R> {
    pub fn user_id(&self) -> Uuid {
        self.identity.user_id
    }
}

#[async_trait]
impl<R: RequiredRole> FromRequestParts<AppState> for Authorized<R> {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentSession(identity) = CurrentSession::from_request_parts(parts, state)
            .await
            .unwrap_or(CurrentSession(None));

        let access = match identity.as_ref() {
            None => require_role(None, R::ROLE, |_| Ok(None))?,
            Some(identity) => {
                let mut conn = state.db()?;
                require_role(Some(identity), R::ROLE, |user_id| {
                    Accounts::new(&mut conn).stored_role(user_id)
                })?
            }
        };

        match access {
            Access::Allow(identity) => Ok(Authorized {
                identity,
                _role: PhantomData,
            }),
            Access::Deny(denial) => {
                let stale = denial.reason == DenyReason::StaleSession;
                let error = AppError::from(denial);
                if stale {
                    Err(error.with_cookie(state.sessions.terminate()))
                } else {
                    Err(error)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Role;

    #[test]
    fn roles_parse_their_own_names() {
        for role in [Role::Freelancer, Role::Employer] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("Employer"), None);
    }
}
