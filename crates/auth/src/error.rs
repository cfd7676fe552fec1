//! Authorization error types.

use common::Role;
use store::StoreError;
use thiserror::Error;

use crate::capability::Operation;

/// Errors raised while authenticating a caller or checking their role.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No bearer token was supplied for a protected operation.
    #[error("Missing bearer token")]
    MissingCredential,

    /// The token signature, shape or expiry did not check out.
    #[error("Invalid or expired token")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),

    /// The token names a user that no longer exists.
    #[error("Unknown user")]
    UnknownUser,

    /// The caller's role is not allowed to perform the operation.
    #[error("Role '{role}' may not perform {operation:?}")]
    Forbidden { operation: Operation, role: Role },

    /// Login failed. Unknown user and wrong password share this variant.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Hashing or parsing a stored password hash failed.
    #[error("Password hash error: {0}")]
    PasswordHash(String),

    /// Signing a token failed.
    #[error("Token encoding error: {0}")]
    TokenEncoding(#[source] jsonwebtoken::errors::Error),

    /// User lookup failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Returns true for the failures a client sees as 401.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            AuthError::MissingCredential
                | AuthError::InvalidToken(_)
                | AuthError::UnknownUser
                | AuthError::InvalidCredentials
        )
    }
}

/// Convenience type alias for authorization results.
pub type Result<T> = std::result::Result<T, AuthError>;
