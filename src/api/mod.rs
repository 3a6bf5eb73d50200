//! HTTP API: controllers and the route table.

pub mod routes;
pub mod user;

pub use routes::{build_routes, ApiDeps};
pub use user::UserController;
