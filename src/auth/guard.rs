use diesel::QueryResult;
use uuid::Uuid;

use super::{Identity, Role};
use crate::error::{AppError, ErrorKind};

pub const LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allow(Identity),
    Deny(Denial),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Unauthenticated,
    /// The session claims a role the account no longer has.
    StaleSession,
    WrongRole,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub reason: DenyReason,
    pub redirect_to: &'static str,
}

impl Denial {
    fn unauthenticated() -> Self {
        Self {
            reason: DenyReason::Unauthenticated,
            redirect_to: LOGIN_PATH,
        }
    }
}

impl From<Denial> for AppError {
    fn from(denial: Denial) -> Self {
        let error = match denial.reason {
            DenyReason::Unauthenticated => AppError::unauthenticated(),
            DenyReason::StaleSession => AppError::new(
                ErrorKind::Unauthenticated,
                "your session has expired, please log in again",
            ),
            DenyReason::WrongRole => {
                AppError::new(ErrorKind::WrongRole, "you do not have access to that page")
            }
        };
        error.redirect_to(denial.redirect_to)
    }
}

/// Decides whether `identity` may act as `required`.
///
/// The role claimed by the session is never trusted on its own: `stored_role`
/// is consulted on every call and both must match. `stored_role` yields
/// `None` when the user no longer exists.
pub fn require_role<F>(
    identity: Option<&Identity>,
    required: Role,
    stored_role: F,
) -> QueryResult<Access>
where
    F: FnOnce(Uuid) -> QueryResult<Option<String>>,
{
    let Some(identity) = identity else {
        return Ok(Access::Deny(Denial::unauthenticated()));
    };

    let Some(stored) = stored_role(identity.user_id)? else {
        tracing::warn!(user_id = %identity.user_id, "session refers to a missing user");
        return Ok(Access::Deny(Denial::unauthenticated()));
    };
    let stored = Role::parse(&stored);

    if identity.role == required && stored == Some(required) {
        return Ok(Access::Allow(Identity {
            user_id: identity.user_id,
            role: required,
        }));
    }

    if let Some(stored) = stored.filter(|stored| *stored != identity.role) {
        tracing::warn!(
            user_id = %identity.user_id,
            claimed_role = identity.role.as_str(),
            stored_role = stored.as_str(),
            "session role disagrees with the account"
        );
        return Ok(Access::Deny(Denial {
            reason: DenyReason::StaleSession,
            redirect_to: LOGIN_PATH,
        }));
    }

    tracing::warn!(
        user_id = %identity.user_id,
        claimed_role = identity.role.as_str(),
        stored_role = stored.map(Role::as_str).unwrap_or("unknown"),
        required_role = required.as_str(),
        "role check denied access"
    );

    Ok(Access::Deny(Denial {
        reason: DenyReason::WrongRole,
        redirect_to: stored.map(Role::dashboard_path).unwrap_or(LOGIN_PATH),
    }))
}
