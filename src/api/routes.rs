//! Route table.
//!
//! ```text
//! GET  /health
//! /api/v1/user      register, login, list
//!     [auth]        info, profile [rate limit], edit, delete
//! /api/v1/admin     [auth, admin] users
//! /api/v1/api       [api key] data
//! ```

use std::sync::Arc;

use crate::api::user::{api_data, health, UserController};
use crate::auth::TokenService;
use crate::context::RequestContext;
use crate::dto::{DeleteRequest, ListRequest, LoginRequest, RegisterRequest, UpdateRequest};
use crate::http::middleware::{require_admin, require_api_key, require_auth, RateLimiter};
use crate::http::router::ElegantRouter;

/// Collaborators the route table wires in.
#[derive(Clone)]
pub struct ApiDeps {
    pub users: UserController,
    pub tokens: Arc<TokenService>,
    pub limiter: Arc<RateLimiter>,
    pub api_keys: Vec<String>,
}

/// Bind a controller method as an endpoint.
macro_rules! endpoint {
    ($controller:expr, $method:ident, $req:ty) => {{
        let controller = $controller.clone();
        move |ctx: RequestContext, req: $req| {
            let controller = controller.clone();
            async move { controller.$method(ctx, req).await }
        }
    }};
    ($controller:expr, $method:ident) => {{
        let controller = $controller.clone();
        move |ctx: RequestContext| {
            let controller = controller.clone();
            async move { controller.$method(ctx).await }
        }
    }};
}

pub fn build_routes(deps: &ApiDeps) -> ElegantRouter {
    let users = &deps.users;
    let auth = require_auth(deps.tokens.clone());

    let mut router = ElegantRouter::new();
    router.get("/health", health);

    router.group("/api/v1", Vec::new(), |v1| {
        v1.group("/user", Vec::new(), |user| {
            user.post("/register", endpoint!(users, register, RegisterRequest));
            user.post("/login", endpoint!(users, login, LoginRequest));
            user.post("/list", endpoint!(users, list, ListRequest));

            user.group("", vec![auth.clone()], |authed| {
                authed.get("/info", endpoint!(users, info));
                authed.route_with(
                    axum::routing::MethodFilter::GET,
                    "/profile",
                    vec![deps.limiter.clone().middleware()],
                    endpoint!(users, info),
                );
                authed.post("/edit", endpoint!(users, edit, UpdateRequest));
                authed.post("/delete", endpoint!(users, delete, DeleteRequest));
            });
        });

        v1.group("/admin", vec![auth.clone(), require_admin()], |admin| {
            admin.get("/users", endpoint!(users, list, ListRequest));
        });

        v1.group("/api", vec![require_api_key(deps.api_keys.clone())], |api| {
            api.get("/data", api_data);
        });
    });

    router
}
