use axum::extract::FromRequestParts;
use axum::http::header::{ COOKIE, SET_COOKIE };
use axum::http::request::Parts;
use axum::http::{ HeaderMap, HeaderValue };
use axum::response::Response;
use std::convert::Infallible;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "lt_session";
pub const SESSION_HEADER: &str = "x-session-id";
const MAX_SESSION_ID_LEN: usize = 128;

/// Identifies whose history a request reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub id: String,
    /// Set when the id was minted for this request and must be sent back.
    pub is_new: bool,
}

impl SessionContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let provided = headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|id| is_valid_session_id(id))
            .or_else(|| read_cookie(headers, SESSION_COOKIE).filter(|id| is_valid_session_id(id)));

        match provided {
            Some(id) => Self { id, is_new: false },
            None => Self { id: Uuid::new_v4().to_string(), is_new: true },
        }
    }

    pub fn set_cookie_value(&self) -> Option<HeaderValue> {
        if !self.is_new {
            return None;
        }
        HeaderValue::from_str(
            &format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, self.id)
        ).ok()
    }

    /// Adds `Set-Cookie` to `response` for freshly minted sessions.
    pub fn attach(&self, mut response: Response) -> Response {
        if let Some(value) = self.set_cookie_value() {
            response.headers_mut().append(SET_COOKIE, value);
        }
        response
    }
}

impl<S> FromRequestParts<S> for SessionContext where S: Send + Sync {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(raw) = header.to_str() else {
            continue;
        };
        for pair in raw.split(';') {
            let mut kv = pair.trim().splitn(2, '=');
            if kv.next() == Some(name) {
                return kv.next().map(|v| v.trim().to_string());
            }
        }
    }
    None
}

fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty() &&
        id.len() <= MAX_SESSION_ID_LEN &&
        id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn header_wins_over_cookie() {
        let ctx = SessionContext::from_headers(
            &headers(&[("x-session-id", "U1234abcd"), ("cookie", "lt_session=cookie-id")])
        );
        assert_eq!(ctx, SessionContext { id: "U1234abcd".into(), is_new: false });
        assert!(ctx.set_cookie_value().is_none());
    }

    #[test]
    fn reads_session_cookie_among_others() {
        let ctx = SessionContext::from_headers(
            &headers(&[("cookie", "theme=dark; lt_session=abc-123; lang=zh")])
        );
        assert_eq!(ctx.id, "abc-123");
        assert!(!ctx.is_new);
    }

    #[test]
    fn mints_new_id_for_missing_or_bad_values() {
        let fresh = SessionContext::from_headers(&HeaderMap::new());
        assert!(fresh.is_new);
        assert!(Uuid::parse_str(&fresh.id).is_ok());
        let cookie = fresh.set_cookie_value().unwrap();
        assert!(cookie.to_str().unwrap().starts_with(&format!("lt_session={}", fresh.id)));

        let bad = SessionContext::from_headers(&headers(&[("cookie", "lt_session=../../etc")]));
        assert!(bad.is_new);
        let long = "a".repeat(200);
        let too_long = SessionContext::from_headers(&headers(&[("x-session-id", long.as_str())]));
        assert!(too_long.is_new);
    }

    #[test]
    fn invalid_header_falls_back_to_cookie() {
        let ctx = SessionContext::from_headers(
            &headers(&[("x-session-id", "not a valid id!"), ("cookie", "lt_session=cookie-id")])
        );
        assert_eq!(ctx, SessionContext { id: "cookie-id".into(), is_new: false });
        assert!(ctx.set_cookie_value().is_none());
    }
}
