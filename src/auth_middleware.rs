//! Application-password authentication middleware — §4.K.
//!
//! Grounded on this file's own prior `auth_middleware`/`AuthContext`/
//! `AuthContextExt` shape (axum middleware, `extensions_mut().insert`,
//! an extension trait for downstream handlers), adapted from API-key
//! header extraction to HTTP Basic Auth, and from an in-process
//! `ApiKeyService` to a `GatewayAuthClient` trait mirroring
//! `examples/original_source/services/proxy/pkg/middleware/app_auth.go`'s
//! `AppAuthAuthenticator.Authenticate`: public-path short-circuit, basic
//! auth extraction, a gateway RPC with `type = "appauth"`, user-role
//! application, and context attachment — returning no-auth on any
//! failure rather than ever panicking or surfacing a partial context.

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Path prefixes handled by a different authenticator (§4.K: "another
/// authenticator handles them"). Requests under these paths are passed
/// through unauthenticated by this middleware.
const PUBLIC_PATH_PREFIXES: &[&str] = &["/health", "/status.php", "/public/"];

fn is_public_path(path: &str) -> bool {
    PUBLIC_PATH_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// Error response for authentication failures.
#[derive(Debug, Serialize)]
pub struct AuthError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// The resolved identity of a successfully authenticated request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub user_email: String,
    pub roles: Vec<String>,
    pub token: String,
}

/// A user as returned by the upstream app-auth RPC, before role mapping.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub user_email: String,
}

/// The "appauth" RPC and role-mapping collaborators this middleware
/// delegates to — the gateway and the role assigner in `app_auth.go` are
/// both out-of-scope external services per §1; this crate only calls the
/// narrow contract below.
#[async_trait]
pub trait GatewayAuthClient: Send + Sync {
    /// Validate `client_id`/`client_secret` via the upstream "appauth"
    /// RPC. Returns `Ok(None)` (not an error) when the credentials are
    /// rejected — only transport/RPC failures are `Err`.
    async fn authenticate(&self, client_id: &str, client_secret: &str) -> Result<Option<(AuthenticatedUser, String)>, anyhow::Error>;

    /// Resolve the roles to attach to `user`. A transport/RPC failure
    /// here also counts as an authentication failure (`app_auth.go`
    /// treats `ApplyUserRole` errors identically to an auth failure).
    async fn apply_user_role(&self, user: &AuthenticatedUser) -> Result<Vec<String>, anyhow::Error>;
}

fn extract_basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = base64_decode(encoded)?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

fn base64_decode(input: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(input).ok()
}

/// Authenticate a request via application passwords (§4.K). Public paths
/// are passed through untouched; any failure along the way — missing
/// basic-auth header, rejected credentials, RPC error, role-assignment
/// error — results in a 401 with no `AuthContext` ever attached.
#[instrument(skip_all)]
pub async fn app_auth_middleware(
    State(gateway): State<Arc<dyn GatewayAuthClient>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let path = request.uri().path().to_string();

    if is_public_path(&path) {
        debug!(path = %path, "public path, skipping app-password auth");
        return Ok(next.run(request).await);
    }

    let headers = request.headers().clone();
    let Some((client_id, client_secret)) = extract_basic_auth(&headers) else {
        return Err(unauthorized());
    };

    let authenticated = match gateway.authenticate(&client_id, &client_secret).await {
        Ok(Some(result)) => result,
        Ok(None) => {
            debug!(client_id = %client_id, "app auth rejected credentials");
            return Err(unauthorized());
        }
        Err(e) => {
            warn!(client_id = %client_id, error = %e, "app auth gateway RPC failed");
            return Err(unauthorized());
        }
    };
    let (user, token) = authenticated;

    let roles = match gateway.apply_user_role(&user).await {
        Ok(roles) => roles,
        Err(e) => {
            warn!(client_id = %client_id, error = %e, "app auth: failed to load user roles");
            return Err(unauthorized());
        }
    };

    let auth_context = AuthContext {
        user_id: user.user_id,
        user_email: user.user_email,
        roles,
        token,
    };

    debug!(user_email = %auth_context.user_email, path = %path, "app-password authentication succeeded");

    let mut request = request;
    request.extensions_mut().insert(auth_context);

    Ok(next.run(request).await)
}

fn unauthorized() -> AuthError {
    AuthError {
        error: "unauthorized".to_string(),
        message: "authentication failed".to_string(),
        status_code: 401,
    }
}

/// Extension trait to extract the resolved identity from request
/// extensions in downstream handlers.
pub trait AuthContextExt {
    fn auth_context(&self) -> Option<&AuthContext>;
}

impl AuthContextExt for Request {
    fn auth_context(&self) -> Option<&AuthContext> {
        self.extensions().get::<AuthContext>()
    }
}
