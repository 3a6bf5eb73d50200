//! Handler adapter and route grouping.
//!
//! # Responsibilities
//! - Adapt `(ctx, req) -> Result<R, E>` and `(ctx) -> Result<R, E>` business
//!   functions into axum handlers
//! - Bind the typed request before the business function runs
//! - Dispatch results and errors to the envelope responder
//! - Group routes under a prefix with inherited middleware
//!
//! # Data Flow
//! ```text
//! global layers (server.rs)
//!     → group middleware (outer group first)
//!     → route middleware
//!     → Endpoint::call
//!         → binder::bind::<T>      (failure → ParamError envelope)
//!         → business fn, raced against ctx.cancelled()
//!                                  (cancelled / deadline → Timeout envelope)
//!         → success / error envelope
//! ```
//!
//! # Design Decisions
//! - One `route()` serves every verb; `get`/`post`/... only fix the method
//! - The request type is fixed at registration by the function signature
//! - Middleware is type-erased so groups can hold heterogeneous chains

use std::future::Future;
use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{on, MethodFilter, MethodRouter};
use axum::Router;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::context::RequestContext;
use crate::errors::{AppError, BoxError, ErrorCode};
use crate::http::binder::{bind, Validate};
use crate::http::middleware::context::ensure_context;
use crate::http::response::{self, Envelope};

type MiddlewareFn = dyn Fn(Request, Next) -> BoxFuture<'static, Response> + Send + Sync;

/// A type-erased `(Request, Next) -> Response` middleware.
#[derive(Clone)]
pub struct Middleware {
    inner: Arc<MiddlewareFn>,
}

impl Middleware {
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |req, next| f(req, next).boxed()),
        }
    }

    fn apply(&self, route: MethodRouter) -> MethodRouter {
        let mw = self.clone();
        route.route_layer(axum::middleware::from_fn(move |req: Request, next: Next| {
            let mw = mw.clone();
            async move { (mw.inner)(req, next).await }
        }))
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Middleware")
    }
}

/// A business function the adapter can serve.
///
/// `M` distinguishes the supported signatures and is inferred at registration.
pub trait Endpoint<M>: Clone + Send + Sync + 'static {
    fn call(self, ctx: RequestContext, request: Request) -> BoxFuture<'static, Response>;
}

impl<F, Fut, R, E> Endpoint<()> for F
where
    F: Fn(RequestContext) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Serialize + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    fn call(self, ctx: RequestContext, _request: Request) -> BoxFuture<'static, Response> {
        async move {
            let business = self(ctx.clone());
            run_business(&ctx, business).await
        }
        .boxed()
    }
}

impl<F, Fut, T, R, E> Endpoint<(T,)> for F
where
    F: Fn(RequestContext, T) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    T: DeserializeOwned + Validate + Send + 'static,
    R: Serialize + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    fn call(self, ctx: RequestContext, request: Request) -> BoxFuture<'static, Response> {
        async move {
            let req = match bind::<T>(request).await {
                Ok(req) => req,
                Err(err) => return render_error(&ctx, &err),
            };
            let business = self(ctx.clone(), req);
            run_business(&ctx, business).await
        }
        .boxed()
    }
}

/// Drive the business future until it finishes or the context is cancelled.
///
/// A context already cancelled before the call never starts the business
/// function; one cancelled mid-flight drops it and answers `Timeout`.
async fn run_business<Fut, R, E>(ctx: &RequestContext, business: Fut) -> Response
where
    Fut: Future<Output = Result<R, E>>,
    R: Serialize,
    E: Into<BoxError>,
{
    if ctx.is_cancelled() {
        return timed_out(ctx);
    }
    tokio::select! {
        biased;
        _ = ctx.cancelled() => timed_out(ctx),
        result = business => dispatch(ctx, result),
    }
}

fn dispatch<R, E>(ctx: &RequestContext, result: Result<R, E>) -> Response
where
    R: Serialize,
    E: Into<BoxError>,
{
    match result {
        Ok(data) => response::success(&data),
        Err(err) => {
            let err: BoxError = err.into();
            render_error(ctx, err.as_ref())
        }
    }
}

fn render_error(ctx: &RequestContext, err: &(dyn std::error::Error + 'static)) -> Response {
    let envelope = Envelope::from_error(err);
    ctx.add_log_field("error_code", envelope.code);
    ctx.add_log_field("error", err.to_string());
    envelope.into_response()
}

fn timed_out(ctx: &RequestContext) -> Response {
    render_error(ctx, &AppError::new(ErrorCode::Timeout))
}

fn adapt<H, M>(filter: MethodFilter, handler: H) -> MethodRouter
where
    H: Endpoint<M>,
    M: 'static,
{
    on(filter, move |mut request: Request| {
        let handler = handler.clone();
        async move {
            let ctx = ensure_context(&mut request);
            handler.call(ctx, request).await
        }
    })
}

/// Route table with prefix groups and inherited middleware.
pub struct ElegantRouter {
    prefix: String,
    middlewares: Vec<Middleware>,
    routes: Vec<(String, MethodRouter)>,
}

impl ElegantRouter {
    pub fn new() -> Self {
        Self {
            prefix: String::new(),
            middlewares: Vec::new(),
            routes: Vec::new(),
        }
    }

    /// Register routes under `prefix`. `middlewares` wrap every route of the
    /// group, inside any middleware inherited from enclosing groups.
    pub fn group<F>(&mut self, prefix: &str, middlewares: Vec<Middleware>, build: F) -> &mut Self
    where
        F: FnOnce(&mut ElegantRouter),
    {
        let mut group = ElegantRouter {
            prefix: join_path(&self.prefix, prefix),
            middlewares: self.middlewares.iter().cloned().chain(middlewares).collect(),
            routes: Vec::new(),
        };
        build(&mut group);
        self.routes.append(&mut group.routes);
        self
    }

    /// Register `handler` for `filter` on `path` with extra route middleware.
    pub fn route_with<H, M>(
        &mut self,
        filter: MethodFilter,
        path: &str,
        middlewares: Vec<Middleware>,
        handler: H,
    ) -> &mut Self
    where
        H: Endpoint<M>,
        M: 'static,
    {
        let chain: Vec<&Middleware> = self.middlewares.iter().chain(middlewares.iter()).collect();
        // Last applied runs first
        let method_router = chain
            .into_iter()
            .rev()
            .fold(adapt(filter, handler), |route, mw| mw.apply(route));

        self.routes.push((join_path(&self.prefix, path), method_router));
        self
    }

    pub fn route<H, M>(&mut self, filter: MethodFilter, path: &str, handler: H) -> &mut Self
    where
        H: Endpoint<M>,
        M: 'static,
    {
        self.route_with(filter, path, Vec::new(), handler)
    }

    pub fn get<H: Endpoint<M>, M: 'static>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(MethodFilter::GET, path, handler)
    }

    pub fn post<H: Endpoint<M>, M: 'static>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(MethodFilter::POST, path, handler)
    }

    pub fn put<H: Endpoint<M>, M: 'static>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(MethodFilter::PUT, path, handler)
    }

    pub fn delete<H: Endpoint<M>, M: 'static>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(MethodFilter::DELETE, path, handler)
    }

    pub fn patch<H: Endpoint<M>, M: 'static>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(MethodFilter::PATCH, path, handler)
    }

    /// Registered `(path)` list in registration order.
    pub fn paths(&self) -> Vec<&str> {
        self.routes.iter().map(|(p, _)| p.as_str()).collect()
    }

    /// Build the axum router, with envelope fallbacks for unknown paths and
    /// unsupported methods.
    pub fn into_router(self) -> Router {
        self.routes
            .into_iter()
            .fold(Router::new(), |router, (path, method_router)| {
                router.route(&path, method_router)
            })
            .fallback(not_found)
            .method_not_allowed_fallback(method_not_allowed)
    }
}

impl Default for ElegantRouter {
    fn default() -> Self {
        Self::new()
    }
}

async fn not_found() -> Response {
    AppError::new(ErrorCode::NotFound).into_response()
}

async fn method_not_allowed() -> Response {
    AppError::new(ErrorCode::MethodNotAllowed).into_response()
}

fn join_path(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (prefix.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{path}"),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}/{path}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, StatusCode};
    use parking_lot::Mutex;
    use serde::Deserialize;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    #[derive(Debug, Deserialize)]
    struct Echo {
        name: String,
    }

    impl Validate for Echo {}

    async fn echo(_ctx: RequestContext, req: Echo) -> Result<Value, AppError> {
        Ok(json!({ "hello": req.name }))
    }

    async fn call(router: Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let req = builder
            .body(Body::from(body.unwrap_or("").to_string()))
            .unwrap();
        let res = router.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", ""), "/");
        assert_eq!(join_path("", "health"), "/health");
        assert_eq!(join_path("/api/v1/", "/user"), "/api/v1/user");
        assert_eq!(join_path("/api", ""), "/api");
    }

    #[tokio::test]
    async fn test_bound_handler_success() {
        let mut r = ElegantRouter::new();
        r.post("/echo", echo);
        let (status, body) = call(r.into_router(), Method::POST, "/echo", Some(r#"{"name":"x"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"code": 0, "message": "success", "data": {"hello": "x"}}));
    }

    #[tokio::test]
    async fn test_bind_failure_skips_business_fn() {
        let called = Arc::new(Mutex::new(false));
        let flag = called.clone();
        let mut r = ElegantRouter::new();
        r.post("/echo", move |_ctx: RequestContext, _req: Echo| {
            let flag = flag.clone();
            async move {
                *flag.lock() = true;
                Ok::<_, AppError>(())
            }
        });

        let (_, body) = call(r.into_router(), Method::POST, "/echo", Some("{}")).await;
        assert_eq!(body["code"], 10002);
        assert!(!*called.lock());
    }

    #[tokio::test]
    async fn test_no_request_handler_and_unit_result() {
        let mut r = ElegantRouter::new();
        r.get("/ping", |_ctx: RequestContext| async { Ok::<_, AppError>(()) });
        let (_, body) = call(r.into_router(), Method::GET, "/ping", None).await;
        assert_eq!(body, json!({"code": 0, "message": "success", "data": null}));
    }

    #[tokio::test]
    async fn test_foreign_error_becomes_system_error() {
        let mut r = ElegantRouter::new();
        r.get("/fail", |_ctx: RequestContext| async {
            Err::<(), _>(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
        });
        let (_, body) = call(r.into_router(), Method::GET, "/fail", None).await;
        assert_eq!(body["code"], 10001);
        assert_eq!(body["detail"], "boom");
    }

    #[tokio::test]
    async fn test_error_recorded_on_context() {
        let ctx = RequestContext::new();
        let mut r = ElegantRouter::new();
        r.get("/forbidden", |_ctx: RequestContext| async {
            Err::<(), _>(AppError::new(ErrorCode::Forbidden))
        });

        let mut req = axum::http::Request::builder()
            .uri("/forbidden")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut().insert(ctx.clone());
        r.into_router().oneshot(req).await.unwrap();

        let fields = ctx.log_fields();
        assert!(fields.iter().any(|f| f.key == "error_code" && f.value == json!(10005)));
    }

    #[tokio::test]
    async fn test_cancelled_context_yields_timeout() {
        let ctx = RequestContext::new();
        ctx.cancel();
        let mut r = ElegantRouter::new();
        r.get("/slow", |_ctx: RequestContext| async { Ok::<_, AppError>("never") });

        let mut req = axum::http::Request::builder().uri("/slow").body(Body::empty()).unwrap();
        req.extensions_mut().insert(ctx);
        let res = r.into_router().oneshot(req).await.unwrap();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], 10009);
    }

    #[tokio::test]
    async fn test_deadline_during_business_fn_yields_timeout() {
        let ctx = RequestContext::builder().timeout(Duration::from_millis(50)).build();
        let finished = Arc::new(Mutex::new(false));
        let flag = finished.clone();
        let mut r = ElegantRouter::new();
        r.get("/slow", move |_ctx: RequestContext| {
            let flag = flag.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                *flag.lock() = true;
                Ok::<_, AppError>("late")
            }
        });

        let mut req = axum::http::Request::builder().uri("/slow").body(Body::empty()).unwrap();
        req.extensions_mut().insert(ctx.clone());
        let res = r.into_router().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], 10009);
        assert!(!*finished.lock());
        assert!(ctx.log_fields().iter().any(|f| f.key == "error_code" && f.value == json!(10009)));
    }

    #[tokio::test]
    async fn test_fallbacks() {
        let mut r = ElegantRouter::new();
        r.post("/echo", echo);
        let router = r.into_router();

        let (status, body) = call(router.clone(), Method::GET, "/nowhere", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], 10006);

        let (_, body) = call(router, Method::GET, "/echo", None).await;
        assert_eq!(body["code"], 10007);
    }

    #[tokio::test]
    async fn test_middleware_order_and_groups() {
        let trail = Arc::new(Mutex::new(Vec::<&'static str>::new()));
        let mark = |name: &'static str| {
            let trail = trail.clone();
            Middleware::from_fn(move |req, next: Next| {
                let trail = trail.clone();
                async move {
                    trail.lock().push(name);
                    next.run(req).await
                }
            })
        };

        let mut r = ElegantRouter::new();
        r.group("/api", vec![mark("outer")], |api| {
            api.group("/v1", vec![mark("inner")], |v1| {
                v1.route_with(
                    MethodFilter::GET,
                    "/thing",
                    vec![mark("route")],
                    |_ctx: RequestContext| async { Ok::<_, AppError>(1) },
                );
            });
        });
        assert_eq!(r.paths(), vec!["/api/v1/thing"]);

        let (_, body) = call(r.into_router(), Method::GET, "/api/v1/thing", None).await;
        assert_eq!(body["data"], 1);
        assert_eq!(*trail.lock(), vec!["outer", "inner", "route"]);
    }

    #[tokio::test]
    async fn test_group_middleware_can_short_circuit() {
        let deny = Middleware::from_fn(|_req, _next: Next| async {
            AppError::new(ErrorCode::Unauthorized).into_response()
        });
        let mut r = ElegantRouter::new();
        r.group("/private", vec![deny], |g| {
            g.get("/x", |_ctx: RequestContext| async { Ok::<_, AppError>("secret") });
        });
        r.get("/public", |_ctx: RequestContext| async { Ok::<_, AppError>("open") });
        let router = r.into_router();

        let (_, body) = call(router.clone(), Method::GET, "/private/x", None).await;
        assert_eq!(body["code"], 10004);
        let (_, body) = call(router, Method::GET, "/public", None).await;
        assert_eq!(body["data"], "open");
    }
}
