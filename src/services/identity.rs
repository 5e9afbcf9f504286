use axum::extract::Query;
use axum::http::{header, request::Parts, HeaderValue};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::core::{config::Settings, security};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IdentitySource {
    Token,
    Query,
    Cookie,
    Generated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StudentIdentity {
    pub(crate) student_id: Uuid,
    pub(crate) source: IdentitySource,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum IdentityError {
    #[error("invalid bearer token")]
    InvalidToken,
    #[error("student_id query parameter is not a valid id")]
    InvalidQuery,
}

/// Supplies a stable student id for each request.
pub(crate) trait IdentityResolver: Send + Sync {
    fn resolve(&self, parts: &Parts) -> Result<StudentIdentity, IdentityError>;

    /// `Set-Cookie` value that pins `identity` for later requests, when needed.
    fn persist(&self, identity: &StudentIdentity) -> Option<HeaderValue>;
}

#[derive(Debug, Deserialize)]
struct IdentityQuery {
    student_id: Option<String>,
}

/// Bearer token `sub`, then `student_id` query, then cookie, then a fresh id.
pub(crate) struct RequestIdentityResolver {
    settings: Settings,
}

impl RequestIdentityResolver {
    pub(crate) fn new(settings: Settings) -> Self {
        Self { settings }
    }

    fn from_token(&self, parts: &Parts) -> Result<Option<Uuid>, IdentityError> {
        let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
            return Ok(None);
        };

        let token = value
            .to_str()
            .ok()
            .and_then(|raw| raw.strip_prefix("Bearer "))
            .ok_or(IdentityError::InvalidToken)?;

        let claims = security::verify_token(token.trim(), &self.settings)
            .map_err(|_| IdentityError::InvalidToken)?;

        Uuid::parse_str(&claims.sub).map(Some).map_err(|_| IdentityError::InvalidToken)
    }

    fn from_query(&self, parts: &Parts) -> Result<Option<Uuid>, IdentityError> {
        let Ok(Query(query)) = Query::<IdentityQuery>::try_from_uri(&parts.uri) else {
            return Ok(None);
        };

        match query.student_id.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
            Some(raw) => Uuid::parse_str(raw).map(Some).map_err(|_| IdentityError::InvalidQuery),
            None => Ok(None),
        }
    }

    fn from_cookie(&self, parts: &Parts) -> Option<Uuid> {
        let name = &self.settings.attempts().student_cookie_name;

        parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|raw| raw.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| key == name)
            .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
    }
}

impl IdentityResolver for RequestIdentityResolver {
    fn resolve(&self, parts: &Parts) -> Result<StudentIdentity, IdentityError> {
        if let Some(student_id) = self.from_token(parts)? {
            return Ok(StudentIdentity { student_id, source: IdentitySource::Token });
        }
        if let Some(student_id) = self.from_query(parts)? {
            return Ok(StudentIdentity { student_id, source: IdentitySource::Query });
        }
        if let Some(student_id) = self.from_cookie(parts) {
            return Ok(StudentIdentity { student_id, source: IdentitySource::Cookie });
        }

        let student_id = Uuid::new_v4();
        tracing::debug!(student_id = %student_id, "Issued new student identity");
        Ok(StudentIdentity { student_id, source: IdentitySource::Generated })
    }

    fn persist(&self, identity: &StudentIdentity) -> Option<HeaderValue> {
        if identity.source == IdentitySource::Cookie {
            return None;
        }

        let attempts = self.settings.attempts();
        let max_age = attempts.student_cookie_max_age_days.saturating_mul(24 * 60 * 60);
        let cookie = format!(
            "{}={}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax",
            attempts.student_cookie_name, identity.student_id
        );

        HeaderValue::from_str(&cookie).ok()
    }
}
