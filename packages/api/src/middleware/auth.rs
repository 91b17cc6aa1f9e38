use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::{
    error::ApiError,
    store::{DynAccountStore, StoreError},
    token::TokenService,
};

/// Roles a route accepts. An empty set makes authentication optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleSet(&'static [&'static str]);

impl RoleSet {
    pub const ANY: RoleSet = RoleSet(&[]);
    pub const USER: RoleSet = RoleSet(&["user"]);
    pub const ADMIN: RoleSet = RoleSet(&["admin"]);
    pub const USER_OR_ADMIN: RoleSet = RoleSet(&["user", "admin"]);

    pub const fn new(roles: &'static [&'static str]) -> Self {
        RoleSet(roles)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, role: &str) -> bool {
        self.0.contains(&role)
    }
}

/// Outcome of the gate, available to handlers as `Extension<AuthContext>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    pub subject_id: Option<i64>,
    /// Only resolved when the route required a role.
    pub role: Option<String>,
    pub authenticated: bool,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn subject(&self) -> Result<i64, ApiError> {
        self.subject_id
            .ok_or_else(|| ApiError::unauthorized("Unauthorized: account_id not found in context"))
    }
}

#[derive(Clone)]
pub struct AuthGate {
    tokens: Arc<TokenService>,
    accounts: DynAccountStore,
}

impl AuthGate {
    pub fn new(tokens: Arc<TokenService>, accounts: DynAccountStore) -> Self {
        Self { tokens, accounts }
    }

    /// Decides a request from its required roles and raw `Authorization` value.
    ///
    /// Only "no roles required and no header" is admitted anonymously. A header that
    /// is present is always validated, even on optional-auth routes.
    pub async fn evaluate(
        &self,
        required: RoleSet,
        authorization: Option<&str>,
    ) -> Result<AuthContext, ApiError> {
        let authorization = authorization.filter(|value| !value.is_empty());

        let Some(header) = authorization else {
            if required.is_empty() {
                return Ok(AuthContext::anonymous());
            }
            return Err(ApiError::unauthorized("Missing Authorization header"));
        };

        let token = header
            .strip_prefix("Bearer ")
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::unauthorized("Invalid Authorization header"))?;

        let subject_id = self.tokens.validate(token)?;

        if required.is_empty() {
            return Ok(AuthContext {
                subject_id: Some(subject_id),
                role: None,
                authenticated: true,
            });
        }

        let role = match self.accounts.role_label(subject_id).await {
            Ok(role) => role,
            Err(StoreError::NotFound) => {
                return Err(ApiError::forbidden("Permission denied: cannot retrieve role"));
            }
            Err(err) => return Err(err.into()),
        };

        if !required.contains(&role) {
            return Err(ApiError::forbidden("Forbidden: insufficient permissions"));
        }

        Ok(AuthContext {
            subject_id: Some(subject_id),
            role: Some(role),
            authenticated: true,
        })
    }

    pub fn guard(&self, required: RoleSet) -> RoleGuard {
        RoleGuard {
            gate: self.clone(),
            required,
        }
    }
}

/// Per-route middleware state: the gate plus the roles that route accepts.
#[derive(Clone)]
pub struct RoleGuard {
    gate: AuthGate,
    required: RoleSet,
}

pub async fn require_roles(
    State(guard): State<RoleGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response<Body>, ApiError> {
    let header = match request.headers().get(AUTHORIZATION) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| ApiError::unauthorized("Invalid Authorization header"))?,
        ),
        None => None,
    };

    let context = guard.gate.evaluate(guard.required, header).await?;
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryAccountStore;
    use axum::{
        Extension, Json, Router,
        http::StatusCode,
        middleware::from_fn_with_state,
        response::IntoResponse,
        routing::get,
    };
    use tower::ServiceExt;

    const SECRET: &str = "gate-secret";

    fn gate(accounts: MemoryAccountStore) -> (AuthGate, Arc<TokenService>) {
        let tokens = Arc::new(TokenService::new(SECRET).unwrap());
        (AuthGate::new(tokens.clone(), Arc::new(accounts)), tokens)
    }

    fn accounts() -> MemoryAccountStore {
        let store = MemoryAccountStore::default();
        store.add_account(1, "user");
        store.add_account(2, "admin");
        store
    }

    fn bearer(tokens: &TokenService, id: i64) -> String {
        format!("Bearer {}", tokens.issue(id).unwrap())
    }

    #[tokio::test]
    async fn optional_auth_without_header_is_anonymous() {
        let (gate, _) = gate(accounts());
        let ctx = gate.evaluate(RoleSet::ANY, None).await.unwrap();
        assert_eq!(ctx, AuthContext::anonymous());
        assert!(!ctx.authenticated);
    }

    #[tokio::test]
    async fn optional_auth_with_valid_header_carries_subject() {
        let (gate, tokens) = gate(accounts());
        let header = bearer(&tokens, 1);
        let ctx = gate.evaluate(RoleSet::ANY, Some(&header)).await.unwrap();
        assert_eq!(ctx.subject_id, Some(1));
        assert!(ctx.authenticated);
        assert_eq!(ctx.role, None);
    }

    #[tokio::test]
    async fn optional_auth_still_rejects_bad_tokens() {
        let (gate, _) = gate(accounts());
        let err = gate
            .evaluate(RoleSet::ANY, Some("Bearer nonsense"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn required_roles_without_header_is_401() {
        let (gate, _) = gate(accounts());
        let err = gate.evaluate(RoleSet::USER, None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err = gate.evaluate(RoleSet::USER, Some("")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_scheme_is_401() {
        let (gate, tokens) = gate(accounts());
        let raw = tokens.issue(1).unwrap();
        for header in [raw.clone(), format!("bearer {raw}"), "Bearer ".to_string()] {
            let err = gate.evaluate(RoleSet::USER, Some(&header)).await.unwrap_err();
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED, "header {header:?}");
        }
    }

    #[tokio::test]
    async fn role_outside_set_is_403() {
        let (gate, tokens) = gate(accounts());
        let header = bearer(&tokens, 1);
        let err = gate.evaluate(RoleSet::ADMIN, Some(&header)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.code(), "FORBIDDEN");
    }

    #[tokio::test]
    async fn role_inside_set_is_admitted_with_role() {
        let (gate, tokens) = gate(accounts());
        let header = bearer(&tokens, 2);
        let ctx = gate
            .evaluate(RoleSet::USER_OR_ADMIN, Some(&header))
            .await
            .unwrap();
        assert_eq!(ctx.subject_id, Some(2));
        assert_eq!(ctx.role.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn unknown_account_is_403() {
        let (gate, tokens) = gate(accounts());
        let header = bearer(&tokens, 99);
        let err = gate.evaluate(RoleSet::USER, Some(&header)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn role_store_failure_is_500() {
        let store = accounts();
        store.fail_role_lookups();
        let (gate, tokens) = gate(store);
        let header = bearer(&tokens, 1);
        let err = gate.evaluate(RoleSet::USER, Some(&header)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    async fn whoami(Extension(ctx): Extension<AuthContext>) -> impl IntoResponse {
        Json(serde_json::json!({
            "subject": ctx.subject_id,
            "authenticated": ctx.authenticated,
        }))
    }

    #[tokio::test]
    async fn middleware_attaches_context_to_request() {
        let (gate, tokens) = gate(accounts());
        let app = Router::new()
            .route("/open", get(whoami))
            .route_layer(from_fn_with_state(gate.guard(RoleSet::ANY), require_roles));

        let anonymous = app
            .clone()
            .oneshot(axum::http::Request::get("/open").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::OK);
        let body = axum::body::to_bytes(anonymous.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["subject"], serde_json::Value::Null);
        assert_eq!(body["authenticated"], false);

        let authed = app
            .oneshot(
                axum::http::Request::get("/open")
                    .header(AUTHORIZATION, bearer(&tokens, 1))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = axum::body::to_bytes(authed.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["subject"], 1);
        assert_eq!(body["authenticated"], true);
    }
}
