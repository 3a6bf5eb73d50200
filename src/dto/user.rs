//! User API request and response shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::http::binder::Validate;
use crate::storage::User;

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), String> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(format!("{field} must be between {min} and {max} characters"));
    }
    Ok(())
}

fn check_required(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} is required"));
    }
    Ok(())
}

fn check_email(value: &str) -> Result<(), String> {
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() >= 2
                && domain.split('.').all(|label| !label.is_empty())
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err("email is not a valid address".to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), String> {
        check_len("username", &self.username, 3, 20)?;
        check_len("password", &self.password, 6, 20)?;
        check_email(&self.email)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisterResponse {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), String> {
        check_required("username", &self.username)?;
        check_required("password", &self.password)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginResponse {
    pub token: String,
}

/// Pagination plus exact-match filters. Empty filters are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListRequest {
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default, rename = "pageSize", alias = "page_size")]
    pub page_size: Option<u64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl ListRequest {
    pub fn page(&self) -> u64 {
        self.page.filter(|p| *p > 0).unwrap_or(1)
    }

    pub fn page_size(&self) -> u64 {
        self.page_size.filter(|s| *s > 0).unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn offset(&self) -> u64 {
        (self.page() - 1).saturating_mul(self.page_size())
    }
}

impl Validate for ListRequest {
    fn validate(&self) -> Result<(), String> {
        if self.page == Some(0) {
            return Err("page must be at least 1".to_string());
        }
        match self.page_size {
            Some(size) if size == 0 || size > MAX_PAGE_SIZE => {
                Err(format!("pageSize must be between 1 and {MAX_PAGE_SIZE}"))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRequest {
    pub id: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Validate for UpdateRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(username) = &self.username {
            check_len("username", username, 3, 20)?;
        }
        if let Some(email) = &self.email {
            check_email(email)?;
        }
        if let Some(password) = &self.password {
            check_len("password", password, 6, 20)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteRequest {
    pub id: u64,
}

impl Validate for DeleteRequest {}

/// Public view of a user. Never carries the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub list: Vec<UserResponse>,
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiDataResponse {
    pub data: String,
}
