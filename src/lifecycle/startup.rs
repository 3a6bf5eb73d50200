//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order from a validated config
//! - Register background jobs
//!
//! # Data Flow
//! ```text
//! AppConfig
//!     → store, cache, token service
//!     → UserService → UserController
//!     → ApiDeps (+ rate limiter, API keys)
//!     → Scheduler (cache sweep)
//! ```
//!
//! # Design Decisions
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last, in main (traffic only when ready)

use std::sync::Arc;

use crate::api::{ApiDeps, UserController};
use crate::auth::TokenService;
use crate::cache::{Cache, MemoryCache};
use crate::config::AppConfig;
use crate::errors::BoxError;
use crate::http::middleware::RateLimiter;
use crate::observability::{LogField, LogSink};
use crate::scheduler::{Scheduler, SchedulerError};
use crate::service::{UserService, UserServiceSettings};
use crate::storage::{MemoryUserStore, UserStore};

pub const CACHE_SWEEP_JOB: &str = "cache-sweep";
pub const RATE_LIMIT_PRUNE_JOB: &str = "rate-limit-prune";

/// Everything the server and the scheduler share.
#[derive(Clone)]
pub struct Components {
    pub store: Arc<dyn UserStore>,
    pub cache: Arc<dyn Cache>,
    pub tokens: Arc<TokenService>,
    pub service: Arc<UserService>,
    pub api: ApiDeps,
}

impl Components {
    /// Wire the in-process store and cache.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::with_backends(
            config,
            Arc::new(MemoryUserStore::new()),
            Arc::new(MemoryCache::new()),
        )
    }

    /// An empty `auth.jwt_secret` is replaced by a random one for this instance.
    pub fn with_backends(config: &AppConfig, store: Arc<dyn UserStore>, cache: Arc<dyn Cache>) -> Self {
        let mut auth = config.auth.clone();
        auth.ensure_secret();
        let tokens = Arc::new(TokenService::new(&auth.jwt_secret, auth.token_ttl_secs));
        let service = Arc::new(UserService::new(
            store.clone(),
            cache.clone(),
            tokens.clone(),
            UserServiceSettings::from_config(config),
        ));
        let api = ApiDeps {
            users: UserController::new(service.clone()),
            tokens: tokens.clone(),
            limiter: Arc::new(RateLimiter::new(
                config.security.rate_limit_rps,
                config.security.rate_limit_burst,
            )),
            api_keys: config.auth.api_keys.clone(),
        };

        Self {
            store,
            cache,
            tokens,
            service,
            api,
        }
    }

    /// Scheduler with the maintenance jobs registered.
    pub fn scheduler(&self, config: &AppConfig, logger: Arc<dyn LogSink>) -> Result<Scheduler, SchedulerError> {
        let mut scheduler = Scheduler::new(logger);
        let cache = self.cache.clone();
        scheduler.add_job(&config.cache.sweep_schedule, CACHE_SWEEP_JOB, move |ctx| {
            let cache = cache.clone();
            async move {
                let purged = cache.purge_expired().await?;
                if purged > 0 {
                    ctx.log_info("expired cache entries purged", &[LogField::new("purged", purged)]);
                }
                Ok::<_, BoxError>(())
            }
        })?;

        let limiter = self.api.limiter.clone();
        scheduler.add_job(&config.cache.sweep_schedule, RATE_LIMIT_PRUNE_JOB, move |ctx| {
            let pruned = limiter.prune_idle();
            async move {
                if pruned > 0 {
                    ctx.log_debug("idle rate limit buckets pruned", &[LogField::new("pruned", pruned)]);
                }
                Ok::<_, BoxError>(())
            }
        })?;
        Ok(scheduler)
    }
}
