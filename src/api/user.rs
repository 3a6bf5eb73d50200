//! User controllers.
//!
//! Thin adapters between the router and `UserService`. Each method has the
//! `(ctx, req) -> Result<R, AppError>` shape the router adapts.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::context::RequestContext;
use crate::dto::{
    ApiDataResponse, DeleteRequest, ListRequest, ListResponse, LoginRequest, LoginResponse,
    RegisterRequest, RegisterResponse, UpdateRequest, UserResponse,
};
use crate::errors::AppError;
use crate::service::UserService;

#[derive(Clone)]
pub struct UserController {
    service: Arc<UserService>,
}

impl UserController {
    pub fn new(service: Arc<UserService>) -> Self {
        Self { service }
    }

    pub async fn register(&self, ctx: RequestContext, req: RegisterRequest) -> Result<RegisterResponse, AppError> {
        self.service.register(&ctx, req).await
    }

    pub async fn login(&self, ctx: RequestContext, req: LoginRequest) -> Result<LoginResponse, AppError> {
        self.service.login(&ctx, req).await
    }

    pub async fn list(&self, ctx: RequestContext, req: ListRequest) -> Result<ListResponse, AppError> {
        self.service.list(&ctx, req).await
    }

    pub async fn info(&self, ctx: RequestContext) -> Result<UserResponse, AppError> {
        self.service.current(&ctx).await
    }

    pub async fn edit(&self, ctx: RequestContext, req: UpdateRequest) -> Result<(), AppError> {
        self.service.update(&ctx, req).await.map(|_| ())
    }

    pub async fn delete(&self, ctx: RequestContext, req: DeleteRequest) -> Result<(), AppError> {
        self.service.delete(&ctx, req).await
    }
}

pub async fn health(_ctx: RequestContext) -> Result<Value, AppError> {
    Ok(json!({ "status": "ok" }))
}

/// Payload served to API-key clients.
pub async fn api_data(ctx: RequestContext) -> Result<ApiDataResponse, AppError> {
    ctx.log_debug("api data served", &[]);
    Ok(ApiDataResponse {
        data: "protected data".to_string(),
    })
}
