//! Principal extraction. The session/auth layer is an external wrapper; the
//! core trusts the identity headers it injects:
//! `x-user-id`, `x-user-role`, `x-view-all`, `x-impersonate`.

use app_core::{CoreError, Principal, Role};
use axum::{extract::FromRequestParts, http::request::Parts};
use crate::error::ApiError;

/// Extracted caller; `None` when the identity headers are absent, which the
/// tenant gate turns into `Unauthorized`.
pub struct Caller(pub Option<Principal>);

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(user_id) = header(parts, "x-user-id") else {
            return Ok(Caller(None));
        };
        let user_id: i64 = user_id.parse().map_err(|_| {
            ApiError::from(CoreError::Unauthorized("malformed x-user-id".into()))
        })?;

        let role = match header(parts, "x-user-role").unwrap_or("user") {
            "user" => Role::User,
            "admin" => Role::Admin,
            "superadmin" => Role::Superadmin,
            other => {
                return Err(ApiError::from(CoreError::Unauthorized(format!(
                    "unknown role: {other}"
                ))));
            }
        };

        let view_all = header(parts, "x-view-all")
            .map(|v| v == "1" || v == "true")
            .unwrap_or(false);

        let impersonate = match header(parts, "x-impersonate") {
            Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
                ApiError::from(CoreError::Unauthorized("malformed x-impersonate".into()))
            })?),
            None => None,
        };

        Ok(Caller(Some(Principal {
            user_id,
            role,
            view_all,
            impersonate,
        })))
    }
}
