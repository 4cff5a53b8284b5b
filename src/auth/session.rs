use anyhow::{Context, Result};
use axum::http::HeaderValue;
use axum_extra::headers::Cookie;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Identity, Role};
use crate::config::AppConfig;

pub const SESSION_COOKIE_NAME: &str = "session";

/// Issues and reads the signed session cookie.
#[derive(Clone)]
pub struct SessionService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    expiry: Duration,
    cookie_secure: bool,
    cookie_domain: Option<String>,
}

impl SessionService {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            encoding: EncodingKey::from_secret(config.session_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.session_secret.as_bytes()),
            issuer: config.session_issuer.clone(),
            audience: config.session_audience.clone(),
            expiry: Duration::minutes(config.session_expiry_minutes),
            cookie_secure: config.session_cookie_secure,
            cookie_domain: config.session_cookie_domain.clone(),
        })
    }

    pub fn generate_token(&self, user_id: Uuid, role: Role) -> Result<String> {
        let now = Utc::now();
        let exp = now + self.expiry;
        let claims = SessionClaims {
            sub: user_id,
            role: role.as_str().to_owned(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_token(&self, token: &str) -> Result<SessionClaims> {
        let mut validation = Validation::default();
        validation.set_audience(&[self.audience.clone()]);
        validation.set_issuer(&[self.issuer.clone()]);
        let data = decode::<SessionClaims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }

    /// Identity carried by the request cookies, if the session token verifies.
    pub fn authenticate(&self, cookies: &Cookie) -> Option<Identity> {
        let token = cookies.get(SESSION_COOKIE_NAME).filter(|v| !v.is_empty())?;
        let claims = match self.verify_token(token) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::debug!(error = %err, "rejected session token");
                return None;
            }
        };
        let role = Role::parse(&claims.role)?;
        Some(Identity {
            user_id: claims.sub,
            role,
        })
    }

    pub fn establish(&self, user_id: Uuid, role: Role) -> Result<HeaderValue> {
        let token = self.generate_token(user_id, role)?;
        let expires_at = Utc::now() + self.expiry;

        let mut parts = vec![format!("{}={}", SESSION_COOKIE_NAME, token)];
        parts.push("Path=/".into());
        parts.push("HttpOnly".into());
        parts.push("SameSite=Lax".into());
        parts.push(format!("Max-Age={}", self.expiry.num_seconds()));
        parts.push(format!("Expires={}", expires_at.to_rfc2822()));
        self.push_scope(&mut parts);

        HeaderValue::from_str(&parts.join("; ")).context("session cookie is not a valid header")
    }

    pub fn terminate(&self) -> HeaderValue {
        let mut parts = vec![format!("{}=", SESSION_COOKIE_NAME)];
        parts.push("Path=/".into());
        parts.push("HttpOnly".into());
        parts.push("SameSite=Lax".into());
        parts.push("Max-Age=0".into());
        parts.push("Expires=Thu, 01 Jan 1970 00:00:00 GMT".into());
        self.push_scope(&mut parts);

        HeaderValue::from_str(&parts.join("; "))
            .unwrap_or_else(|_| HeaderValue::from_static("session=; Path=/; Max-Age=0"))
    }

    fn push_scope(&self, parts: &mut Vec<String>) {
        if self.cookie_secure {
            parts.push("Secure".into());
        }
        if let Some(domain) = &self.cookie_domain {
            parts.push(format!("Domain={}", domain));
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub role: String,
    pub iss: String,
    pub aud: String,
    pub iat: usize,
    pub exp: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_extra::headers::HeaderMapExt;
    use axum::http::{header::COOKIE, HeaderMap};
    use std::path::PathBuf;

    fn service(secret: &str) -> SessionService {
        let config = AppConfig {
            database_url: "postgres://localhost/jobboard".into(),
            database_max_pool_size: 1,
            run_migrations: false,
            server_host: "127.0.0.1".into(),
            server_port: 0,
            session_secret: secret.into(),
            session_issuer: "test-issuer".into(),
            session_audience: "test-audience".into(),
            session_expiry_minutes: 60,
            session_cookie_secure: true,
            session_cookie_domain: None,
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: 1024,
            cors_allowed_origin: None,
        };
        SessionService::from_config(&config).unwrap()
    }

    fn cookies(raw: &str) -> Cookie {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(raw).unwrap());
        headers.typed_get::<Cookie>().unwrap()
    }

    fn token_from(set_cookie: &HeaderValue) -> String {
        let raw = set_cookie.to_str().unwrap();
        raw.strip_prefix("session=")
            .and_then(|rest| rest.split(';').next())
            .unwrap()
            .to_string()
    }

    #[test]
    fn established_session_authenticates() {
        let sessions = service("secret");
        let user_id = Uuid::new_v4();
        let header = sessions.establish(user_id, Role::Employer).unwrap();
        let raw = header.to_str().unwrap();
        assert!(raw.contains("Max-Age=3600"));
        assert!(raw.contains("HttpOnly"));
        assert!(raw.contains("Secure"));

        let token = token_from(&header);
        let identity = sessions
            .authenticate(&cookies(&format!("session={token}")))
            .unwrap();
        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.role, Role::Employer);
    }

    #[test]
    fn token_signed_with_other_secret_is_ignored() {
        let forged = service("attacker").generate_token(Uuid::new_v4(), Role::Employer).unwrap();
        assert!(service("secret")
            .authenticate(&cookies(&format!("session={forged}")))
            .is_none());
    }

    #[test]
    fn unsigned_values_do_not_authenticate() {
        let sessions = service("secret");
        assert!(sessions
            .authenticate(&cookies("user_id=1; role=employer"))
            .is_none());
        assert!(sessions.authenticate(&cookies("session=")).is_none());
    }

    #[test]
    fn terminate_expires_cookie_immediately() {
        let header = service("secret").terminate();
        let raw = header.to_str().unwrap();
        assert!(raw.starts_with("session=;"));
        assert!(raw.contains("Max-Age=0"));
        assert!(raw.contains("1970"));
    }
}
