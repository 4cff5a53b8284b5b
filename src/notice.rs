//! One-shot messages carried across a redirect in a short-lived cookie.
//!
//! A POST handler redirects with a `notice` cookie; the next page read
//! renders it once and clears the cookie.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::SET_COOKIE, request::Parts, HeaderMap, HeaderValue},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::{headers::Cookie, TypedHeader};
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Serialize;

use crate::error::ErrorKind;

pub const NOTICE_COOKIE_NAME: &str = "notice";
const NOTICE_MAX_AGE_SECONDS: i64 = 60;
const SUCCESS_CODE: &str = "success";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub code: String,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            code: SUCCESS_CODE.to_string(),
            message: message.into(),
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code: kind.code(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    pub fn to_cookie(&self) -> HeaderValue {
        let encoded = utf8_percent_encode(&self.message, NON_ALPHANUMERIC);
        let value = format!(
            "{NOTICE_COOKIE_NAME}={}:{encoded}; Path=/; HttpOnly; SameSite=Lax; Max-Age={NOTICE_MAX_AGE_SECONDS}",
            self.code
        );
        HeaderValue::from_str(&value).unwrap_or_else(|_| clear_cookie())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let (code, encoded) = raw.split_once(':')?;
        if code != SUCCESS_CODE && ErrorKind::parse(code).is_none() {
            return None;
        }
        let message = percent_decode_str(encoded).decode_utf8().ok()?;
        Some(Self {
            code: code.to_string(),
            message: message.into_owned(),
        })
    }
}

pub fn clear_cookie() -> HeaderValue {
    HeaderValue::from_static(
        "notice=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
    )
}

/// Redirect to `location` with a success notice.
pub fn redirect_with(location: &str, notice: Notice) -> (HeaderMap, Redirect) {
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, notice.to_cookie());
    (headers, Redirect::to(location))
}

/// The notice left by the previous redirect, if any.
#[derive(Debug, Default)]
pub struct PendingNotice(pub Option<Notice>);

#[async_trait]
impl<S> FromRequestParts<S> for PendingNotice
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let notice = TypedHeader::<Cookie>::from_request_parts(parts, state)
            .await
            .ok()
            .and_then(|TypedHeader(cookies)| {
                cookies.get(NOTICE_COOKIE_NAME).and_then(Notice::parse)
            });
        Ok(PendingNotice(notice))
    }
}

/// A JSON page view that renders and consumes the pending notice.
#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub notice: Option<Notice>,
    #[serde(flatten)]
    pub body: T,
}

impl<T: Serialize> Page<T> {
    pub fn new(pending: PendingNotice, body: T) -> Self {
        Self {
            notice: pending.0,
            body,
        }
    }
}

impl<T: Serialize> IntoResponse for Page<T> {
    fn into_response(self) -> Response {
        let consumed = self.notice.is_some();
        let mut response = Json(self).into_response();
        if consumed {
            response.headers_mut().insert(SET_COOKIE, clear_cookie());
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_value_survives_parse() {
        let notice = Notice::error(ErrorKind::DuplicateApplication, "You have already applied!");
        let header = notice.to_cookie();
        let raw = header.to_str().unwrap();
        let value = raw
            .strip_prefix("notice=")
            .and_then(|rest| rest.split(';').next())
            .unwrap();
        assert_eq!(Notice::parse(value), Some(notice));
    }

    #[test]
    fn rejects_unknown_codes() {
        assert_eq!(Notice::parse("teapot:hello"), None);
        assert_eq!(Notice::parse("no-separator"), None);
    }

    #[test]
    fn success_notice_is_flagged() {
        let notice = Notice::success("Job uploaded successfully!");
        assert!(notice.is_success());
        assert!(Notice::parse("success:Job%20uploaded").unwrap().is_success());
    }
}
