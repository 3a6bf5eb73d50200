//! Application error code registry.
//!
//! # Responsibilities
//! - Define the closed set of numeric codes returned in envelopes
//! - Map every code to exactly one canonical message
//!
//! # Design Decisions
//! - Codes are grouped by family: 0 success, 1xxxx system, 200xx user, 202xx persistence
//! - Lookup by raw integer is total: unknown codes resolve to the system error message

use serde::{Serialize, Serializer};

/// A registered application error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    Success = 0,

    // System level
    SystemError = 10001,
    ParamError = 10002,
    DbError = 10003,
    Unauthorized = 10004,
    Forbidden = 10005,
    NotFound = 10006,
    MethodNotAllowed = 10007,
    TooManyRequests = 10008,
    Timeout = 10009,

    // User domain
    UserNotExist = 20001,
    PasswordIncorrect = 20002,
    TokenExpired = 20003,
    TokenInvalid = 20004,
    UserAlreadyExists = 20005,
    UsernameTaken = 20006,
    EmailTaken = 20007,
    UserCreateFailed = 20008,
    UserUpdateFailed = 20009,
    UserDeleteFailed = 20010,

    // Persistence domain
    ConnectionFailed = 20201,
    TransactionFailed = 20202,
}

impl ErrorCode {
    /// Every registered code, in numeric order.
    pub const ALL: [ErrorCode; 22] = [
        ErrorCode::Success,
        ErrorCode::SystemError,
        ErrorCode::ParamError,
        ErrorCode::DbError,
        ErrorCode::Unauthorized,
        ErrorCode::Forbidden,
        ErrorCode::NotFound,
        ErrorCode::MethodNotAllowed,
        ErrorCode::TooManyRequests,
        ErrorCode::Timeout,
        ErrorCode::UserNotExist,
        ErrorCode::PasswordIncorrect,
        ErrorCode::TokenExpired,
        ErrorCode::TokenInvalid,
        ErrorCode::UserAlreadyExists,
        ErrorCode::UsernameTaken,
        ErrorCode::EmailTaken,
        ErrorCode::UserCreateFailed,
        ErrorCode::UserUpdateFailed,
        ErrorCode::UserDeleteFailed,
        ErrorCode::ConnectionFailed,
        ErrorCode::TransactionFailed,
    ];

    /// Numeric wire value.
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Canonical message for this code.
    pub const fn message(self) -> &'static str {
        match self {
            ErrorCode::Success => "success",
            ErrorCode::SystemError => "system error",
            ErrorCode::ParamError => "invalid parameters",
            ErrorCode::DbError => "database error",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::NotFound => "resource not found",
            ErrorCode::MethodNotAllowed => "method not allowed",
            ErrorCode::TooManyRequests => "too many requests",
            ErrorCode::Timeout => "request timeout",
            ErrorCode::UserNotExist => "user does not exist",
            ErrorCode::PasswordIncorrect => "incorrect password",
            ErrorCode::TokenExpired => "token expired",
            ErrorCode::TokenInvalid => "invalid token",
            ErrorCode::UserAlreadyExists => "user already exists",
            ErrorCode::UsernameTaken => "username already taken",
            ErrorCode::EmailTaken => "email already taken",
            ErrorCode::UserCreateFailed => "failed to create user",
            ErrorCode::UserUpdateFailed => "failed to update user",
            ErrorCode::UserDeleteFailed => "failed to delete user",
            ErrorCode::ConnectionFailed => "database connection failed",
            ErrorCode::TransactionFailed => "database transaction failed",
        }
    }

    /// Resolve a raw numeric code against the registry.
    pub fn from_i32(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_i32() == code)
    }
}

/// Message for a raw numeric code. Unknown codes get the system error message.
pub fn message_for(code: i32) -> &'static str {
    ErrorCode::from_i32(code)
        .unwrap_or(ErrorCode::SystemError)
        .message()
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_i32())
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}
