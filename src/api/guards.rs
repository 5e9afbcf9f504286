use std::convert::Infallible;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderName, HeaderValue};
use axum::response::{IntoResponseParts, ResponseParts};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::core::state::AppState;

pub(crate) const INTERNAL_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-internal-token");

/// Student behind the request, resolved through the configured identity chain.
pub(crate) struct CurrentStudent {
    pub(crate) student_id: Uuid,
    set_cookie: Option<HeaderValue>,
}

impl CurrentStudent {
    /// Response part that pins the identity in a cookie when it did not come
    /// from one.
    pub(crate) fn cookie(&self) -> IdentityCookie {
        IdentityCookie(self.set_cookie.clone())
    }
}

pub(crate) struct IdentityCookie(Option<HeaderValue>);

impl IntoResponseParts for IdentityCookie {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        if let Some(value) = self.0 {
            res.headers_mut().append(header::SET_COOKIE, value);
        }
        Ok(res)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentStudent {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let identity = state.identity().resolve(parts)?;
        let set_cookie = state.identity().persist(&identity);

        Ok(CurrentStudent { student_id: identity.student_id, set_cookie })
    }
}

/// Caller of the internal API. Open when no internal token is configured.
pub(crate) struct InternalCaller;

#[async_trait]
impl FromRequestParts<AppState> for InternalCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let expected = &state.settings().internal().token;
        if expected.is_empty() {
            return Ok(InternalCaller);
        }

        let provided = parts
            .headers
            .get(&INTERNAL_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized("Internal token required"))?;

        if !token_matches(provided, expected) {
            return Err(ApiError::Forbidden("Invalid internal token"));
        }

        Ok(InternalCaller)
    }
}

fn token_matches(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).unwrap_u8() == 1
}

#[cfg(test)]
mod tests {
    use super::token_matches;

    #[test]
    fn token_compare_requires_exact_match() {
        assert!(token_matches("secret-token", "secret-token"));
        assert!(!token_matches("secret-tokem", "secret-token"));
        assert!(!token_matches("secret", "secret-token"));
        assert!(!token_matches("secret-token-x", "secret-token"));
        assert!(!token_matches("", "secret-token"));
    }
}
