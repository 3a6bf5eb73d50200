//! Request and response types of the HTTP API.

pub mod user;

pub use user::{
    ApiDataResponse, DeleteRequest, ListRequest, ListResponse, LoginRequest, LoginResponse,
    RegisterRequest, RegisterResponse, UpdateRequest, UserResponse,
};
