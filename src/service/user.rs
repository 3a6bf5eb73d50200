//! User business logic.
//!
//! # Responsibilities
//! - Registration with unique username and email
//! - Login with password check, failure lockout and token issue
//! - Lookup (cached), paged listing, update and soft delete
//! - Translate store failures into business error codes
//!
//! # Data Flow
//! ```text
//! controller → UserService
//!                 ├── UserStore    (rows)
//!                 ├── Cache        (user:<id> JSON, login_fail:<username>)
//!                 └── TokenService (login)
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{hash_password, verify_password, TokenService};
use crate::cache::Cache;
use crate::config::AppConfig;
use crate::context::RequestContext;
use crate::dto::{
    DeleteRequest, ListRequest, ListResponse, LoginRequest, LoginResponse, RegisterRequest,
    RegisterResponse, UpdateRequest, UserResponse,
};
use crate::errors::{AppError, ErrorCode};
use crate::observability::LogField;
use crate::storage::{NewUser, StoreError, UniqueField, UserChanges, UserLookup, UserQuery, UserStore};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";

/// Tunables taken from configuration.
#[derive(Debug, Clone)]
pub struct UserServiceSettings {
    pub admin_usernames: HashSet<String>,
    pub cache_enabled: bool,
    pub user_ttl: Duration,
    pub max_login_failures: u64,
    pub lockout: Duration,
}

impl UserServiceSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            admin_usernames: config.auth.admin_usernames.iter().cloned().collect(),
            cache_enabled: config.cache.enabled,
            user_ttl: Duration::from_secs(config.cache.user_ttl_secs),
            max_login_failures: config.security.max_login_failures,
            lockout: Duration::from_secs(config.security.lockout_secs),
        }
    }
}

impl Default for UserServiceSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

pub struct UserService {
    store: Arc<dyn UserStore>,
    cache: Arc<dyn Cache>,
    tokens: Arc<TokenService>,
    settings: UserServiceSettings,
}

fn user_key(id: u64) -> String {
    format!("user:{id}")
}

fn login_fail_key(username: &str) -> String {
    format!("login_fail:{username}")
}

fn store_error(err: StoreError) -> AppError {
    match err {
        StoreError::NotFound => AppError::new(ErrorCode::UserNotExist),
        StoreError::Duplicate(UniqueField::Username) => AppError::new(ErrorCode::UsernameTaken),
        StoreError::Duplicate(UniqueField::Email) => AppError::new(ErrorCode::EmailTaken),
        StoreError::Unavailable(detail) => AppError::with_detail(ErrorCode::ConnectionFailed, detail),
    }
}

/// Treat empty strings as "no filter".
fn filter(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

impl UserService {
    pub fn new(
        store: Arc<dyn UserStore>,
        cache: Arc<dyn Cache>,
        tokens: Arc<TokenService>,
        settings: UserServiceSettings,
    ) -> Self {
        Self {
            store,
            cache,
            tokens,
            settings,
        }
    }

    pub async fn register(
        &self,
        ctx: &RequestContext,
        req: RegisterRequest,
    ) -> Result<RegisterResponse, AppError> {
        if self
            .store
            .exists_by(UniqueField::Username, &req.username)
            .await
            .map_err(store_error)?
        {
            return Err(AppError::new(ErrorCode::UsernameTaken));
        }
        if self
            .store
            .exists_by(UniqueField::Email, &req.email)
            .await
            .map_err(store_error)?
        {
            return Err(AppError::new(ErrorCode::EmailTaken));
        }

        let role = if self.settings.admin_usernames.contains(&req.username) {
            ROLE_ADMIN
        } else {
            ROLE_USER
        };

        let user = self
            .store
            .create(NewUser {
                username: req.username,
                password_hash: hash_password(&req.password),
                email: req.email,
                role: role.to_string(),
            })
            .await
            .map_err(|err| match err {
                StoreError::NotFound => AppError::wrap(ErrorCode::UserCreateFailed, err),
                other => store_error(other),
            })?;

        ctx.log_info(
            "user registered",
            &[
                LogField::new("user_id", user.id),
                LogField::new("username", user.username.clone()),
            ],
        );

        Ok(RegisterResponse {
            message: "registration successful".to_string(),
        })
    }

    pub async fn login(&self, ctx: &RequestContext, req: LoginRequest) -> Result<LoginResponse, AppError> {
        let fail_key = login_fail_key(&req.username);
        if self.failures(ctx, &fail_key).await >= self.settings.max_login_failures {
            ctx.log_warn(
                "login locked out",
                &[LogField::new("username", req.username.clone())],
            );
            return Err(AppError::with_detail(
                ErrorCode::TooManyRequests,
                "too many failed login attempts",
            ));
        }

        let user = self
            .store
            .find_one(&UserLookup::Username(req.username.clone()))
            .await
            .map_err(store_error)?;

        if !verify_password(&req.password, &user.password_hash) {
            self.record_failure(ctx, &fail_key).await;
            ctx.log_warn(
                "login failed",
                &[LogField::new("username", req.username)],
            );
            return Err(AppError::new(ErrorCode::PasswordIncorrect));
        }

        if let Err(err) = self.cache.del(&fail_key).await {
            ctx.log_warn("cache delete failed", &[LogField::new("error", err.to_string())]);
        }

        let token = self.tokens.issue(user.id, &user.username, &user.role)?;
        ctx.log_info(
            "user logged in",
            &[
                LogField::new("user_id", user.id),
                LogField::new("username", user.username),
            ],
        );
        Ok(LoginResponse { token })
    }

    async fn failures(&self, ctx: &RequestContext, key: &str) -> u64 {
        match self.cache.get(key).await {
            Ok(Some(value)) => value.parse().unwrap_or(0),
            Ok(None) => 0,
            Err(err) => {
                ctx.log_warn("cache read failed", &[LogField::new("error", err.to_string())]);
                0
            }
        }
    }

    async fn record_failure(&self, ctx: &RequestContext, key: &str) {
        let result = match self.cache.incr(key).await {
            // The window starts at the first failure
            Ok(1) => self.cache.expire(key, self.settings.lockout).await.map(|_| ()),
            Ok(_) => Ok(()),
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            ctx.log_warn(
                "failed to record login failure",
                &[LogField::new("error", err.to_string())],
            );
        }
    }

    /// Public view of a live user, served from cache when enabled.
    pub async fn info(&self, ctx: &RequestContext, id: u64) -> Result<UserResponse, AppError> {
        let key = user_key(id);
        if self.settings.cache_enabled {
            match self.cache.get(&key).await {
                Ok(Some(cached)) => match serde_json::from_str::<UserResponse>(&cached) {
                    Ok(user) => return Ok(user),
                    Err(err) => ctx.log_warn(
                        "discarding unreadable cache entry",
                        &[LogField::new("key", key.clone()), LogField::new("error", err.to_string())],
                    ),
                },
                Ok(None) => {}
                Err(err) => {
                    ctx.log_warn("cache read failed", &[LogField::new("error", err.to_string())])
                }
            }
        }

        let user = self
            .store
            .find_one(&UserLookup::Id(id))
            .await
            .map_err(store_error)?;
        let response = UserResponse::from(&user);

        if self.settings.cache_enabled {
            match serde_json::to_string(&response) {
                Ok(json) => {
                    if let Err(err) = self.cache.set(&key, json, Some(self.settings.user_ttl)).await {
                        ctx.log_warn("cache write failed", &[LogField::new("error", err.to_string())]);
                    }
                }
                Err(err) => {
                    ctx.log_warn("cache encode failed", &[LogField::new("error", err.to_string())])
                }
            }
        }
        Ok(response)
    }

    /// Info for the authenticated caller.
    pub async fn current(&self, ctx: &RequestContext) -> Result<UserResponse, AppError> {
        let id = caller_id(ctx)?;
        self.info(ctx, id).await
    }

    pub async fn list(&self, _ctx: &RequestContext, req: ListRequest) -> Result<ListResponse, AppError> {
        let query = UserQuery {
            username: filter(&req.username),
            email: filter(&req.email),
        };
        let (page, page_size) = (req.page(), req.page_size());

        let total = self.store.count(&query).await.map_err(store_error)?;
        let rows = self
            .store
            .list(&query, req.offset(), page_size)
            .await
            .map_err(store_error)?;

        Ok(ListResponse {
            list: rows.iter().map(UserResponse::from).collect(),
            page,
            page_size,
            total,
        })
    }

    pub async fn update(&self, ctx: &RequestContext, req: UpdateRequest) -> Result<UserResponse, AppError> {
        authorize_owner(ctx, req.id)?;

        let changes = UserChanges {
            username: filter(&req.username),
            email: filter(&req.email),
            password_hash: req.password.as_deref().map(hash_password),
        };

        let user = if changes.is_empty() {
            self.store.find_one(&UserLookup::Id(req.id)).await
        } else {
            self.store.update(req.id, changes).await
        }
        .map_err(store_error)?;

        self.invalidate(ctx, user.id).await;
        ctx.log_info("user updated", &[LogField::new("user_id", user.id)]);
        Ok(UserResponse::from(&user))
    }

    pub async fn delete(&self, ctx: &RequestContext, req: DeleteRequest) -> Result<(), AppError> {
        authorize_owner(ctx, req.id)?;

        self.store.delete(req.id).await.map_err(store_error)?;
        self.invalidate(ctx, req.id).await;
        ctx.log_info("user deleted", &[LogField::new("user_id", req.id)]);
        Ok(())
    }

    async fn invalidate(&self, ctx: &RequestContext, id: u64) {
        if let Err(err) = self.cache.del(&user_key(id)).await {
            ctx.log_warn("cache invalidation failed", &[LogField::new("error", err.to_string())]);
        }
    }
}

fn caller_id(ctx: &RequestContext) -> Result<u64, AppError> {
    let identity = ctx
        .identity()
        .ok_or_else(|| AppError::new(ErrorCode::Unauthorized))?;
    identity
        .user_id
        .parse()
        .map_err(|_| AppError::with_detail(ErrorCode::TokenInvalid, "malformed subject"))
}

/// Callers may modify themselves; admins may modify anyone.
fn authorize_owner(ctx: &RequestContext, target: u64) -> Result<(), AppError> {
    let identity = ctx
        .identity()
        .ok_or_else(|| AppError::new(ErrorCode::Unauthorized))?;
    if identity.is_admin() || identity.user_id == target.to_string() {
        Ok(())
    } else {
        Err(AppError::new(ErrorCode::Forbidden))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::storage::MemoryUserStore;

    struct Fixture {
        service: UserService,
        store: MemoryUserStore,
        cache: MemoryCache,
        tokens: Arc<TokenService>,
    }

    fn fixture() -> Fixture {
        let store = MemoryUserStore::new();
        let cache = MemoryCache::new();
        let tokens = Arc::new(TokenService::new("test-secret-0123456789", 3600));
        let settings = UserServiceSettings {
            admin_usernames: HashSet::from(["admin".to_string()]),
            max_login_failures: 3,
            ..UserServiceSettings::default()
        };
        let service = UserService::new(
            Arc::new(store.clone()),
            Arc::new(cache.clone()),
            tokens.clone(),
            settings,
        );
        Fixture {
            service,
            store,
            cache,
            tokens,
        }
    }

    fn register_req(username: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            password: "secret1".to_string(),
            email: email.to_string(),
        }
    }

    fn login_req(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    fn as_user(ctx: &RequestContext, id: u64, role: &str) {
        ctx.set_identity(id.to_string(), "someone", role);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let f = fixture();
        let ctx = RequestContext::new();
        f.service.register(&ctx, register_req("alice", "a@example.com")).await.unwrap();

        let err = f
            .service
            .register(&ctx, register_req("alice", "other@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::UsernameTaken);

        let err = f
            .service
            .register(&ctx, register_req("bob", "a@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::EmailTaken);
        assert_eq!(f.store.raw_len(), 1);
    }

    #[tokio::test]
    async fn test_register_stores_hash_and_role() {
        let f = fixture();
        let ctx = RequestContext::new();
        f.service.register(&ctx, register_req("admin", "root@example.com")).await.unwrap();
        f.service.register(&ctx, register_req("carol", "c@example.com")).await.unwrap();

        let admin = f.store.find_one(&UserLookup::Username("admin".into())).await.unwrap();
        assert_eq!(admin.role, ROLE_ADMIN);
        assert_ne!(admin.password_hash, "secret1");
        assert!(verify_password("secret1", &admin.password_hash));

        let carol = f.store.find_one(&UserLookup::Username("carol".into())).await.unwrap();
        assert_eq!(carol.role, ROLE_USER);
    }

    #[tokio::test]
    async fn test_login_issues_verifiable_token() {
        let f = fixture();
        let ctx = RequestContext::new();
        f.service.register(&ctx, register_req("alice", "a@example.com")).await.unwrap();

        let res = f.service.login(&ctx, login_req("alice", "secret1")).await.unwrap();
        let claims = f.tokens.verify(&res.token).unwrap();
        assert_eq!(claims.username, "alice");

        let err = f.service.login(&ctx, login_req("nobody", "secret1")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::UserNotExist);
    }

    #[tokio::test]
    async fn test_login_lockout_after_failures() {
        let f = fixture();
        let ctx = RequestContext::new();
        f.service.register(&ctx, register_req("alice", "a@example.com")).await.unwrap();

        for _ in 0..3 {
            let err = f.service.login(&ctx, login_req("alice", "wrong!!")).await.unwrap_err();
            assert_eq!(err.code(), ErrorCode::PasswordIncorrect);
        }
        // Locked even with the right password
        let err = f.service.login(&ctx, login_req("alice", "secret1")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::TooManyRequests);

        f.cache.del(&login_fail_key("alice")).await.unwrap();
        assert!(f.service.login(&ctx, login_req("alice", "secret1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_successful_login_resets_failures() {
        let f = fixture();
        let ctx = RequestContext::new();
        f.service.register(&ctx, register_req("alice", "a@example.com")).await.unwrap();

        f.service.login(&ctx, login_req("alice", "wrong!!")).await.unwrap_err();
        f.service.login(&ctx, login_req("alice", "secret1")).await.unwrap();
        assert!(!f.cache.exists(&login_fail_key("alice")).await.unwrap());
    }

    #[tokio::test]
    async fn test_info_is_cached_and_invalidated() {
        let f = fixture();
        let ctx = RequestContext::new();
        f.service.register(&ctx, register_req("alice", "a@example.com")).await.unwrap();
        let user = f.store.find_one(&UserLookup::Username("alice".into())).await.unwrap();

        let info = f.service.info(&ctx, user.id).await.unwrap();
        assert_eq!(info.username, "alice");
        assert!(f.cache.exists(&user_key(user.id)).await.unwrap());

        as_user(&ctx, user.id, ROLE_USER);
        f.service
            .update(
                &ctx,
                UpdateRequest {
                    id: user.id,
                    username: Some("alicia".into()),
                    email: None,
                    password: None,
                },
            )
            .await
            .unwrap();
        assert!(!f.cache.exists(&user_key(user.id)).await.unwrap());
        assert_eq!(f.service.info(&ctx, user.id).await.unwrap().username, "alicia");
    }

    #[tokio::test]
    async fn test_list_pages_and_filters() {
        let f = fixture();
        let ctx = RequestContext::new();
        for i in 0..5 {
            f.service
                .register(&ctx, register_req(&format!("user{i}"), &format!("u{i}@example.com")))
                .await
                .unwrap();
        }

        let page = f
            .service
            .list(
                &ctx,
                ListRequest {
                    page: Some(2),
                    page_size: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.list.len(), 2);
        assert_eq!(page.list[0].username, "user2");

        let filtered = f
            .service
            .list(
                &ctx,
                ListRequest {
                    username: Some("user3".into()),
                    email: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(filtered.total, 1);
        assert_eq!((filtered.page, filtered.page_size), (1, 10));
    }

    #[tokio::test]
    async fn test_update_and_delete_require_owner_or_admin() {
        let f = fixture();
        let ctx = RequestContext::new();
        f.service.register(&ctx, register_req("alice", "a@example.com")).await.unwrap();
        f.service.register(&ctx, register_req("bob", "b@example.com")).await.unwrap();
        let alice = f.store.find_one(&UserLookup::Username("alice".into())).await.unwrap();
        let bob = f.store.find_one(&UserLookup::Username("bob".into())).await.unwrap();

        let err = f
            .service
            .delete(&RequestContext::new(), DeleteRequest { id: bob.id })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthorized);

        as_user(&ctx, alice.id, ROLE_USER);
        let err = f.service.delete(&ctx, DeleteRequest { id: bob.id }).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);

        let err = f
            .service
            .update(
                &ctx,
                UpdateRequest {
                    id: alice.id,
                    username: Some("bob".into()),
                    email: None,
                    password: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::UsernameTaken);

        let admin = RequestContext::new();
        as_user(&admin, 999, ROLE_ADMIN);
        f.service.delete(&admin, DeleteRequest { id: bob.id }).await.unwrap();
        let err = f.service.info(&admin, bob.id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::UserNotExist);

        let err = f.service.delete(&admin, DeleteRequest { id: bob.id }).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::UserNotExist);
    }

    #[tokio::test]
    async fn test_password_change_applies_to_login() {
        let f = fixture();
        let ctx = RequestContext::new();
        f.service.register(&ctx, register_req("alice", "a@example.com")).await.unwrap();
        let alice = f.store.find_one(&UserLookup::Username("alice".into())).await.unwrap();

        as_user(&ctx, alice.id, ROLE_USER);
        f.service
            .update(
                &ctx,
                UpdateRequest {
                    id: alice.id,
                    username: None,
                    email: None,
                    password: Some("newpass1".into()),
                },
            )
            .await
            .unwrap();

        assert!(f.service.login(&ctx, login_req("alice", "newpass1")).await.is_ok());
        let err = f.service.login(&ctx, login_req("alice", "secret1")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::PasswordIncorrect);
    }
}
