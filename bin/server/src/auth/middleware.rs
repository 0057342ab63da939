//! Authentication middleware, principal extractor and permission guards.

use axum::{
    extract::{FromRequestParts, RawPathParams, Request, State, rejection::RawPathParamsRejection},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::{self, Next},
    response::Response,
    routing::MethodRouter,
};
use pocketbook_access::{
    AuthenticationError, AuthorizationError, PathParams, Principal, Requirement,
};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;

use super::AppState;
use crate::error::ApiError;

/// Reads the bearer token from the `Authorization` header.
///
/// Returns `Ok(None)` when the header is absent. The scheme is matched
/// case-insensitively and must be followed by a single space and a non-empty
/// token.
///
/// # Errors
///
/// [`AuthenticationError::MalformedCredential`] for any other header shape.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AuthenticationError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AuthenticationError::MalformedCredential)?;
    if value.is_empty() {
        return Ok(None);
    }

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() => {
            Ok(Some(token))
        }
        _ => Err(AuthenticationError::MalformedCredential),
    }
}

/// Attaches the caller's [`Principal`] to the request.
///
/// Requests without a credential continue as anonymous. A credential that is
/// malformed or fails verification ends the request with 401.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = match bearer_token(request.headers())? {
        None => Principal::anonymous(),
        Some(token) => state.codec.verify(token)?,
    };

    debug!(%principal, "request authenticated");
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// The principal of the current request; anonymous if none was attached.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts.extensions.get::<Principal>().cloned().unwrap_or_default(),
        ))
    }
}

/// State of one permission guard.
#[derive(Clone)]
struct Guard {
    app: Arc<AppState>,
    requirements: &'static [Requirement],
}

/// Guards every handler of `route` with `requirements`.
///
/// The handler runs only when at least one requirement is satisfied.
pub fn require(
    route: MethodRouter<Arc<AppState>>,
    app: &Arc<AppState>,
    requirements: &'static [Requirement],
) -> MethodRouter<Arc<AppState>> {
    let guard = Guard {
        app: app.clone(),
        requirements,
    };
    route.route_layer(middleware::from_fn_with_state(guard, enforce))
}

async fn enforce(
    State(guard): State<Guard>,
    CurrentPrincipal(principal): CurrentPrincipal,
    params: Result<RawPathParams, RawPathParamsRejection>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let params: PathParams = params
        .map(|raw| raw.iter().collect())
        .unwrap_or_default();

    match guard
        .app
        .permissions
        .decide(&principal, &params, guard.requirements)
        .await
    {
        Ok(_) => Ok(next.run(request).await),
        Err(AuthorizationError::PermissionDenied) if principal.is_anonymous() => {
            Err(ApiError::AuthenticationRequired)
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).expect("header"));
        headers
    }

    #[test]
    fn missing_header_is_anonymous() {
        assert_eq!(bearer_token(&HeaderMap::new()), Ok(None));
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Ok(Some("abc")));
        assert_eq!(bearer_token(&headers("bearer abc")), Ok(Some("abc")));
        assert_eq!(bearer_token(&headers("BEARER abc")), Ok(Some("abc")));
    }

    #[test]
    fn malformed_headers_are_rejected() {
        for value in ["Bearer", "Bearer ", "Basic abc", "abc", "Token abc"] {
            assert_eq!(
                bearer_token(&headers(value)),
                Err(AuthenticationError::MalformedCredential),
                "{value:?}"
            );
        }
    }
}
