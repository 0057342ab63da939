//! Route table.

use axum::{
    Router, middleware,
    routing::{get, post},
};
use pocketbook_access::Requirement::{Admin, Any, MemberIsTarget};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::{roles, users, version::version};
use crate::auth::{AppState, authenticate, login, refresh, require};

/// Builds the application router.
///
/// Every request passes [`authenticate`] first; each route then declares the
/// requirements its caller must meet.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route(
            "/users",
            require(post(users::create_user), &state, &[Any])
                .merge(require(get(users::list_users), &state, &[Admin])),
        )
        .route(
            "/users/{userID}",
            require(
                get(users::get_user)
                    .patch(users::update_user)
                    .delete(users::delete_user),
                &state,
                &[Admin, MemberIsTarget],
            ),
        )
        .route(
            "/users/{userID}/roles",
            require(
                post(roles::grant_role)
                    .get(roles::list_roles)
                    .delete(roles::revoke_role),
                &state,
                &[Admin],
            ),
        )
        .route("/login", require(post(login), &state, &[Any]))
        .route("/refresh", require(post(refresh), &state, &[Any]));

    Router::new()
        .route("/version", get(version))
        .nest("/api/v1", api)
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryRoleStore, MemoryUserStore, RoleStore};
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{
            Method, Request, StatusCode,
            header::{AUTHORIZATION, CONTENT_TYPE},
        },
    };
    use chrono::Utc;
    use pocketbook_access::{
        AuthenticationError, MemorySessionStore, PasswordHasher, Principal, Role, RoleCacheConfig,
        RoleLoader, RoleSet, SessionLookup, SessionStore, StoreError, TokenCodec, TokenConfig,
    };
    use pocketbook_core::{DeviceId, UserId};
    use rootcause::Report;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const SECRET: &str = "test-signing-secret";

    /// Reversible stand-in so tests do not pay for argon2.
    struct PlainHasher;

    impl PasswordHasher for PlainHasher {
        fn hash(&self, plaintext: &str) -> Result<String, AuthenticationError> {
            Ok(format!("plain${plaintext}"))
        }

        fn verify(&self, hash: &str, plaintext: &str) -> bool {
            hash.strip_prefix("plain$") == Some(plaintext)
        }
    }

    /// Role store whose reads always fail.
    struct BrokenRoles;

    #[async_trait]
    impl RoleLoader for BrokenRoles {
        async fn load_roles(&self, _: &UserId) -> Result<RoleSet, Report<StoreError>> {
            Err(StoreError::Unavailable {
                reason: "connection refused".to_string(),
            }
            .into())
        }
    }

    #[async_trait]
    impl RoleStore for BrokenRoles {
        async fn grant_role(&self, _: &UserId, _: Role) -> Result<(), Report<StoreError>> {
            Ok(())
        }

        async fn revoke_role(&self, _: &UserId, _: Role) -> Result<(), Report<StoreError>> {
            Ok(())
        }
    }

    struct Harness {
        router: Router,
        sessions: Arc<MemorySessionStore>,
        roles: Arc<MemoryRoleStore>,
    }

    fn codec() -> TokenCodec {
        TokenCodec::new(&TokenConfig::with_secret(SECRET)).expect("codec")
    }

    fn app_with_roles<R: RoleStore + 'static>(roles: Arc<R>) -> (Router, Arc<MemorySessionStore>) {
        let sessions = Arc::new(MemorySessionStore::new());
        let state = AppState::new(
            codec(),
            &RoleCacheConfig::default(),
            Arc::new(MemoryUserStore::new()),
            sessions.clone(),
            roles,
            Arc::new(PlainHasher),
        );
        (router(Arc::new(state)), sessions)
    }

    fn harness() -> Harness {
        let roles = Arc::new(MemoryRoleStore::new());
        let (router, sessions) = app_with_roles(roles.clone());
        Harness {
            router,
            sessions,
            roles,
        }
    }

    async fn send(
        router: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        dispatch(router, request).await
    }

    async fn dispatch(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, json)
    }

    /// Registers a user and returns its id.
    async fn sign_up(router: &Router, email: &str) -> String {
        let (status, body) = send(
            router,
            Method::POST,
            "/api/v1/users",
            None,
            Some(json!({"email": email, "password": "hunter2"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().expect("user id").to_string()
    }

    async fn log_in(router: &Router, email: &str, device: &str) -> Value {
        let (status, body) = send(
            router,
            Method::POST,
            "/api/v1/login",
            None,
            Some(json!({"email": email, "password": "hunter2", "device_id": device})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body
    }

    fn access_token(login: &Value) -> &str {
        login["tokens"]["access_token"].as_str().expect("access token")
    }

    fn refresh_token(login: &Value) -> &str {
        login["tokens"]["refresh_token"].as_str().expect("refresh token")
    }

    #[tokio::test]
    async fn version_is_public() {
        let h = harness();
        let (status, body) = send(&h.router, Method::GET, "/version", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn login_issues_tokens_and_stores_session() {
        let h = harness();
        let user_id = sign_up(&h.router, "ann@example.com").await;
        let body = log_in(&h.router, "Ann@Example.com", "phone").await;

        assert!(!access_token(&body).is_empty());
        assert!(!refresh_token(&body).is_empty());
        assert!(body["tokens"]["expiresAt"].is_i64());
        assert_eq!(body["tokens"].as_object().map(|o| o.len()), Some(3));
        assert_eq!(body["user"]["id"], user_id.as_str());
        assert!(body["user"].get("password_hash").is_none());

        assert_eq!(h.sessions.len(), 1);
        let lookup = SessionLookup {
            user_id: UserId::from(user_id.as_str()),
            device_id: DeviceId::from("phone"),
            refresh_token: refresh_token(&body).to_string(),
        };
        assert!(h.sessions.get_session(&lookup).await.is_ok());
    }

    #[tokio::test]
    async fn login_rejects_bad_credentials() {
        let h = harness();
        sign_up(&h.router, "ann@example.com").await;

        for (email, password) in [("ann@example.com", "wrong"), ("bob@example.com", "hunter2")] {
            let (status, body) = send(
                &h.router,
                Method::POST,
                "/api/v1/login",
                None,
                Some(json!({"email": email, "password": password, "device_id": "phone"})),
            )
            .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body, json!({"code": 401, "error": "invalid email or password"}));
        }
    }

    #[tokio::test]
    async fn login_requires_device_id() {
        let h = harness();
        sign_up(&h.router, "ann@example.com").await;
        let (status, body) = send(
            &h.router,
            Method::POST,
            "/api/v1/login",
            None,
            Some(json!({"email": "ann@example.com", "password": "hunter2"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
    }

    #[tokio::test]
    async fn duplicate_sign_up_conflicts() {
        let h = harness();
        sign_up(&h.router, "ann@example.com").await;
        let (status, _) = send(
            &h.router,
            Method::POST,
            "/api/v1/users",
            None,
            Some(json!({"email": "ann@example.com", "password": "other"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn refresh_rotates_the_session() {
        let h = harness();
        sign_up(&h.router, "ann@example.com").await;
        let login = log_in(&h.router, "ann@example.com", "phone").await;

        let (status, refreshed) = send(
            &h.router,
            Method::POST,
            "/api/v1/refresh",
            None,
            Some(json!({"refresh_token": refresh_token(&login), "device_id": "phone"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{refreshed}");
        assert_ne!(refresh_token(&refreshed), refresh_token(&login));

        // The replaced token is dead.
        let (status, body) = send(
            &h.router,
            Method::POST,
            "/api/v1/refresh",
            None,
            Some(json!({"refresh_token": refresh_token(&login), "device_id": "phone"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "session not found");
    }

    #[tokio::test]
    async fn refresh_with_token_overwritten_by_later_login_is_rejected() {
        let h = harness();
        sign_up(&h.router, "ann@example.com").await;
        let first = log_in(&h.router, "ann@example.com", "phone").await;
        let second = log_in(&h.router, "ann@example.com", "phone").await;
        assert_eq!(h.sessions.len(), 1);

        let (status, body) = send(
            &h.router,
            Method::POST,
            "/api/v1/refresh",
            None,
            Some(json!({"refresh_token": refresh_token(&first), "device_id": "phone"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "session not found");

        let (status, _) = send(
            &h.router,
            Method::POST,
            "/api/v1/refresh",
            None,
            Some(json!({"refresh_token": refresh_token(&second), "device_id": "phone"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn refresh_is_bound_to_the_device() {
        let h = harness();
        sign_up(&h.router, "ann@example.com").await;
        let login = log_in(&h.router, "ann@example.com", "phone").await;

        let (status, _) = send(
            &h.router,
            Method::POST,
            "/api/v1/refresh",
            None,
            Some(json!({"refresh_token": refresh_token(&login), "device_id": "laptop"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn access_token_cannot_refresh() {
        let h = harness();
        sign_up(&h.router, "ann@example.com").await;
        let login = log_in(&h.router, "ann@example.com", "phone").await;

        let (status, body) = send(
            &h.router,
            Method::POST,
            "/api/v1/refresh",
            None,
            Some(json!({"refresh_token": access_token(&login), "device_id": "phone"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid token");
    }

    #[tokio::test]
    async fn anonymous_caller_on_protected_route_is_unauthenticated() {
        let h = harness();
        let (status, body) = send(&h.router, Method::GET, "/api/v1/users", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"code": 401, "error": "authentication required"}));
    }

    #[tokio::test]
    async fn member_reaches_only_own_record() {
        let h = harness();
        let ann = sign_up(&h.router, "ann@example.com").await;
        let bob = sign_up(&h.router, "bob@example.com").await;
        let login = log_in(&h.router, "ann@example.com", "phone").await;
        let token = Some(access_token(&login));

        let (status, body) =
            send(&h.router, Method::GET, &format!("/api/v1/users/{ann}"), token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "ann@example.com");

        let (status, body) =
            send(&h.router, Method::GET, &format!("/api/v1/users/{bob}"), token, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, json!({"code": 403, "error": "permission denied"}));

        let (status, _) = send(&h.router, Method::GET, "/api/v1/users", token, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn member_can_change_own_password() {
        let h = harness();
        let ann = sign_up(&h.router, "ann@example.com").await;
        let login = log_in(&h.router, "ann@example.com", "phone").await;

        let (status, _) = send(
            &h.router,
            Method::PATCH,
            &format!("/api/v1/users/{ann}"),
            Some(access_token(&login)),
            Some(json!({"password": "correct horse"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &h.router,
            Method::POST,
            "/api/v1/login",
            None,
            Some(json!({"email": "ann@example.com", "password": "correct horse", "device_id": "phone"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_manages_users_and_roles() {
        let h = harness();
        let admin = sign_up(&h.router, "root@example.com").await;
        let ann = sign_up(&h.router, "ann@example.com").await;
        h.roles
            .grant_role(&UserId::from(admin.as_str()), Role::Admin)
            .await
            .expect("grant");
        let admin_login = log_in(&h.router, "root@example.com", "laptop").await;
        let admin_token = Some(access_token(&admin_login));

        let (status, body) = send(&h.router, Method::GET, "/api/v1/users", admin_token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(2));

        let (status, _) =
            send(&h.router, Method::GET, &format!("/api/v1/users/{ann}"), admin_token, None).await;
        assert_eq!(status, StatusCode::OK);

        // Ann is not an admin yet.
        let ann_login = log_in(&h.router, "ann@example.com", "phone").await;
        let ann_token = Some(access_token(&ann_login));
        let (status, _) = send(&h.router, Method::GET, "/api/v1/users", ann_token, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let roles_uri = format!("/api/v1/users/{ann}/roles");
        let (status, body) = send(
            &h.router,
            Method::POST,
            &roles_uri,
            admin_token,
            Some(json!({"role": "admin"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({"created": true}));

        let (status, body) = send(&h.router, Method::GET, &roles_uri, admin_token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([{"role": "admin"}]));

        // The grant is visible immediately despite the cached denial.
        let (status, _) = send(&h.router, Method::GET, "/api/v1/users", ann_token, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &h.router,
            Method::DELETE,
            &roles_uri,
            admin_token,
            Some(json!({"role": "admin"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"deleted": true}));

        let (status, _) = send(&h.router, Method::GET, "/api/v1/users", ann_token, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) =
            send(&h.router, Method::DELETE, &format!("/api/v1/users/{ann}"), admin_token, None)
                .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"deleted": true}));
    }

    #[tokio::test]
    async fn unknown_role_is_a_bad_request() {
        let h = harness();
        let admin = sign_up(&h.router, "root@example.com").await;
        h.roles
            .grant_role(&UserId::from(admin.as_str()), Role::Admin)
            .await
            .expect("grant");
        let login = log_in(&h.router, "root@example.com", "laptop").await;

        let (status, body) = send(
            &h.router,
            Method::POST,
            &format!("/api/v1/users/{admin}/roles"),
            Some(access_token(&login)),
            Some(json!({"role": "superuser"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "unknown role 'superuser'");
    }

    #[tokio::test]
    async fn malformed_authorization_header_is_rejected() {
        let h = harness();
        for value in ["Basic abc", "Bearer", "Bearer "] {
            let request = Request::builder()
                .method(Method::GET)
                .uri("/version")
                .header(AUTHORIZATION, value)
                .body(Body::empty())
                .expect("request");
            let (status, body) = dispatch(&h.router, request).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{value:?}");
            assert_eq!(body["error"], "Authorization header format must be Bearer {token}");
        }
    }

    #[tokio::test]
    async fn bad_tokens_do_not_fall_back_to_anonymous() {
        let h = harness();
        // Public routes still reject a presented but invalid token.
        let (status, body) =
            send(&h.router, Method::GET, "/version", Some("not.a.token"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid token");

        let forged = TokenCodec::new(&TokenConfig::with_secret("other-secret"))
            .expect("codec")
            .issue(&Principal::new(UserId::from("usr_x")))
            .expect("issue");
        let (status, body) =
            send(&h.router, Method::GET, "/version", Some(&forged.access_token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid token");
    }

    #[tokio::test]
    async fn expired_access_token_is_rejected() {
        let h = harness();
        let ann = sign_up(&h.router, "ann@example.com").await;
        let two_days_ago = Utc::now().timestamp() - 2 * 86_400;
        let stale = codec()
            .issue_at(&Principal::new(UserId::from(ann.as_str())), two_days_ago)
            .expect("issue");

        let (status, body) = send(
            &h.router,
            Method::GET,
            &format!("/api/v1/users/{ann}"),
            Some(&stale.access_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "token has expired");
    }

    #[tokio::test]
    async fn role_store_outage_fails_admin_check_closed() {
        let (router, _) = app_with_roles(Arc::new(BrokenRoles));
        let ann = sign_up(&router, "ann@example.com").await;
        let login = log_in(&router, "ann@example.com", "phone").await;
        let token = Some(access_token(&login));

        // Nothing else can grant access here.
        let (status, body) = send(&router, Method::GET, "/api/v1/users", token, None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal error");

        // The target check still succeeds on its own.
        let (status, _) =
            send(&router, Method::GET, &format!("/api/v1/users/{ann}"), token, None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
