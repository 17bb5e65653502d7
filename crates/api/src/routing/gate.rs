//! Tenant & session gate middleware

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::{COOKIE, HOST, SET_COOKIE},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::auth::{authenticate, Authentication, CookieJar, IdentityProvider, ResponseCookies};

use super::{assets::is_static_asset, strip_context_headers, HostClassifier, LOGIN_PATH};

/// Everything the gate needs, cloned per request
#[derive(Clone)]
pub struct GateState {
    pub classifier: Arc<HostClassifier>,
    pub identity: Arc<dyn IdentityProvider>,
}

/// Classify the request, attach its [`RequestContext`](super::RequestContext),
/// and require a session on gated paths.
///
/// Session lookups that fail for any reason are treated as "no session".
/// Cookies queued in [`ResponseCookies`] during the request, by the gate or
/// by handler extractors, are written on the way out.
pub async fn tenant_gate(
    State(gate): State<GateState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if is_static_asset(&path) {
        strip_context_headers(request.headers_mut());
        return next.run(request).await;
    }

    let host = request_host(&request);
    let context = gate.classifier.classify(host.as_deref(), request.uri().query());

    tracing::debug!(
        host = host.as_deref().unwrap_or(""),
        path = %path,
        subdomain_type = context.subdomain_type().as_str(),
        "Resolved request context"
    );

    context.write_headers(request.headers_mut());
    let requires_session = context.requires_session(&path);
    request.extensions_mut().insert(context);

    let response_cookies = ResponseCookies::default();
    request.extensions_mut().insert(response_cookies.clone());

    if requires_session {
        let mut cookies = CookieJar::from_headers(request.headers());
        let session = match authenticate(gate.identity.as_ref(), &cookies).await {
            Authentication::Authenticated(session) => session,
            Authentication::Unauthenticated => {
                tracing::debug!(path = %path, "No session for gated path, redirecting to login");
                return Redirect::temporary(LOGIN_PATH).into_response();
            }
        };

        // Downstream handlers see the cookies the browser will hold after this response
        if !session.refreshed_cookies.is_empty() {
            cookies.apply(&session.refreshed_cookies);
            let headers = request.headers_mut();
            headers.remove(COOKIE);
            if let Some(value) = cookies.to_header_value() {
                headers.insert(COOKIE, value);
            }
        }
        response_cookies.extend(session.refreshed_cookies);
        request.extensions_mut().insert(session.principal);
    }

    let mut response = next.run(request).await;

    let queued = response_cookies.take();
    if !queued.is_empty() {
        let domain = gate.classifier.cookie_domain(host.as_deref());
        for cookie in queued {
            match cookie.domain(domain.clone()).to_header_value() {
                Ok(value) => {
                    response.headers_mut().append(SET_COOKIE, value);
                }
                Err(e) => tracing::warn!(error = %e, "Dropping unencodable session cookie"),
            }
        }
    }

    response
}

/// Host header, falling back to the URI authority (HTTP/2)
fn request_host(request: &Request) -> Option<String> {
    request
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()))
        .map(str::to_string)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::identity::testing::{user_principal, FakeIdentity, Script};
    use crate::auth::{Principal, ResponseCookies, Session, SetCookie};
    use crate::config::Environment;
    use crate::routing::RequestContext;
    use axum::{
        body::{to_bytes, Body},
        http::{HeaderMap, Request as HttpRequest, StatusCode},
        Extension, Json, Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn echo(
        context: Option<Extension<RequestContext>>,
        principal: Option<Extension<Principal>>,
        headers: HeaderMap,
    ) -> Json<Value> {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
        Json(json!({
            "type": header("x-subdomain-type"),
            "subdomain": header("x-subdomain"),
            "slug": header("x-organization-slug"),
            "context_slug": context.and_then(|Extension(c)| c.organization_slug().map(str::to_string)),
            "principal": principal.map(|Extension(p)| p.subject),
            "cookie": header("cookie"),
        }))
    }

    fn app(identity: Arc<FakeIdentity>) -> Router {
        let state = GateState {
            classifier: Arc::new(HostClassifier::new(
                "example.com",
                "localhost:3000",
                Environment::Development,
            )),
            identity,
        };
        Router::new()
            .fallback(echo)
            .layer(axum::middleware::from_fn_with_state(state, tenant_gate))
    }

    async fn send(app: Router, host: &str, uri: &str) -> Response {
        app.oneshot(
            HttpRequest::builder()
                .uri(uri)
                .header(HOST, host)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn assert_login_redirect(response: &Response) {
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers().get("location").unwrap(), LOGIN_PATH);
    }

    #[tokio::test]
    async fn test_marketing_never_looks_up_session() {
        let identity = Arc::new(FakeIdentity::new(Script::NoSession));

        for (host, path) in [
            ("example.com", "/"),
            ("www.example.com", "/dashboard"),
            ("unrelated.test", "/dashboard"),
        ] {
            let response = send(app(identity.clone()), host, path).await;
            assert_eq!(response.status(), StatusCode::OK, "{host}{path}");
            let body = body_json(response).await;
            assert_eq!(body["type"], "marketing");
            assert!(body["slug"].is_null());
        }
        assert_eq!(identity.calls(), 0);
    }

    #[tokio::test]
    async fn test_tenant_dashboard_without_session_redirects() {
        let identity = Arc::new(FakeIdentity::new(Script::NoSession));
        let response = send(app(identity.clone()), "acme.example.com", "/dashboard").await;
        assert_login_redirect(&response);
        assert_eq!(identity.calls(), 1);
    }

    #[tokio::test]
    async fn test_tenant_dashboard_with_session_passes() {
        let principal = user_principal();
        let identity = Arc::new(FakeIdentity::new(Script::Session(Session::new(principal.clone()))));

        let response = send(app(identity), "acme.example.com", "/dashboard/employees").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["type"], "tenant");
        assert_eq!(body["subdomain"], "acme");
        assert_eq!(body["slug"], "acme");
        assert_eq!(body["context_slug"], "acme");
        assert_eq!(body["principal"], principal.subject.as_str());
    }

    #[tokio::test]
    async fn test_tenant_public_pages_skip_session() {
        let identity = Arc::new(FakeIdentity::new(Script::Fail));
        let response = send(app(identity.clone()), "acme.example.com", "/signup").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["slug"], "acme");
        assert_eq!(identity.calls(), 0);
    }

    #[tokio::test]
    async fn test_tenant_root_without_session_gets_all_headers() {
        let identity = Arc::new(FakeIdentity::new(Script::NoSession));
        let response = send(app(identity.clone()), "acme.example.com", "/").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["type"], "tenant");
        assert_eq!(body["subdomain"], "acme");
        assert_eq!(body["slug"], "acme");
        assert_eq!(identity.calls(), 0);
    }

    #[tokio::test]
    async fn test_root_domain_signup_is_marketing() {
        let identity = Arc::new(FakeIdentity::new(Script::Session(Session::new(user_principal()))));
        let response = send(app(identity.clone()), "example.com", "/signup").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["type"], "marketing");
        assert!(body["subdomain"].is_null());
        assert!(body["slug"].is_null());
        assert!(body["principal"].is_null());
        assert_eq!(identity.calls(), 0);
    }

    #[tokio::test]
    async fn test_superadmin_gates_everything_but_login() {
        let identity = Arc::new(FakeIdentity::new(Script::NoSession));

        let response = send(app(identity.clone()), "admin.example.com", "/login").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["type"], "superadmin");
        assert_eq!(body["subdomain"], "admin");
        assert!(body["slug"].is_null());
        assert_eq!(identity.calls(), 0);

        let response = send(app(identity.clone()), "admin.example.com", "/organizations").await;
        assert_login_redirect(&response);
        assert_eq!(identity.calls(), 1);
    }

    #[tokio::test]
    async fn test_provider_failure_fails_closed() {
        let identity = Arc::new(FakeIdentity::new(Script::Fail));
        let response = send(app(identity), "admin.example.com", "/").await;
        assert_login_redirect(&response);
    }

    #[tokio::test]
    async fn test_dev_host_uses_org_param() {
        let identity = Arc::new(FakeIdentity::new(Script::NoSession));

        let response = send(app(identity.clone()), "localhost:3000", "/?org=acme").await;
        assert_eq!(body_json(response).await["slug"], "acme");

        let response = send(app(identity), "localhost:3000", "/dashboard?org=acme").await;
        assert_login_redirect(&response);
    }

    #[tokio::test]
    async fn test_refreshed_cookies_scoped_to_root_domain() {
        let mut session = Session::new(user_principal());
        session
            .refreshed_cookies
            .push(SetCookie::new("sb-ref-auth-token", "fresh").max_age(60));
        let identity = Arc::new(FakeIdentity::new(Script::Session(session)));

        let response = app(identity)
            .oneshot(
                HttpRequest::builder()
                    .uri("/dashboard")
                    .header(HOST, "acme.example.com")
                    .header(COOKIE, "sb-ref-auth-token=stale; theme=dark")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let set_cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap().to_string();
        assert!(set_cookie.starts_with("sb-ref-auth-token=fresh;"));
        assert!(set_cookie.contains("Domain=.example.com"));

        let body = body_json(response).await;
        assert_eq!(body["cookie"], "sb-ref-auth-token=fresh; theme=dark");
    }

    #[tokio::test]
    async fn test_refreshed_cookies_host_only_in_development() {
        let mut session = Session::new(user_principal());
        session.refreshed_cookies.push(SetCookie::new("a", "b"));
        let identity = Arc::new(FakeIdentity::new(Script::Session(session)));

        let response = send(app(identity), "localhost:3000", "/dashboard?org=acme").await;
        let set_cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(!set_cookie.contains("Domain="));
    }

    #[tokio::test]
    async fn test_spoofed_context_headers_are_replaced() {
        let identity = Arc::new(FakeIdentity::new(Script::NoSession));
        let response = app(identity)
            .oneshot(
                HttpRequest::builder()
                    .uri("/")
                    .header(HOST, "example.com")
                    .header("x-subdomain-type", "superadmin")
                    .header("x-subdomain", "admin")
                    .header("x-organization-slug", "victim")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["type"], "marketing");
        assert!(body["subdomain"].is_null());
        assert!(body["slug"].is_null());
    }

    #[tokio::test]
    async fn test_static_assets_drop_spoofed_context_headers() {
        let identity = Arc::new(FakeIdentity::new(Script::NoSession));
        let response = app(identity)
            .oneshot(
                HttpRequest::builder()
                    .uri("/assets/app.css")
                    .header(HOST, "example.com")
                    .header("x-subdomain-type", "tenant")
                    .header("x-organization-slug", "victim")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = body_json(response).await;
        assert!(body["type"].is_null());
        assert!(body["slug"].is_null());
    }

    #[tokio::test]
    async fn test_cookies_queued_by_handlers_are_written() {
        async fn queue_cookie(Extension(cookies): Extension<ResponseCookies>) -> StatusCode {
            cookies.extend([SetCookie::new("sb-ref-auth-token", "rotated")]);
            StatusCode::NO_CONTENT
        }

        let state = GateState {
            classifier: Arc::new(HostClassifier::new(
                "example.com",
                "localhost:3000",
                Environment::Development,
            )),
            identity: Arc::new(FakeIdentity::new(Script::NoSession)),
        };
        let app = Router::new()
            .route("/api/organizations", axum::routing::post(queue_cookie))
            .layer(axum::middleware::from_fn_with_state(state, tenant_gate));

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/api/organizations")
                    .header(HOST, "example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let set_cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set_cookie.starts_with("sb-ref-auth-token=rotated;"));
        assert!(set_cookie.contains("Domain=.example.com"));
    }

    #[tokio::test]
    async fn test_static_assets_bypass_gate() {
        let identity = Arc::new(FakeIdentity::new(Script::NoSession));

        for path in ["/dashboard/logo.png", "/_next/static/chunks/app.js", "/favicon.ico"] {
            let response = send(app(identity.clone()), "acme.example.com", path).await;
            assert_eq!(response.status(), StatusCode::OK, "{path}");
            let body = body_json(response).await;
            assert!(body["type"].is_null());
            assert!(body["context_slug"].is_null());
        }
        assert_eq!(identity.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_host_is_marketing() {
        let identity = Arc::new(FakeIdentity::new(Script::NoSession));
        let response = app(identity)
            .oneshot(HttpRequest::builder().uri("/dashboard").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["type"], "marketing");
    }
}
