//! Business services.

pub mod user;

pub use user::{UserService, UserServiceSettings, ROLE_ADMIN, ROLE_USER};
