//! Single entry-point check run before every operation.

use common::{Role, UserId};
use serde::Serialize;
use store::UserStore;

use crate::capability::{Access, Operation, access};
use crate::error::{AuthError, Result};
use crate::token::TokenService;

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: UserId,
    pub username: String,
    pub role: Role,
}

/// Resolves bearer tokens into identities and enforces the capability table.
#[derive(Debug, Clone)]
pub struct Authorizer<U> {
    users: U,
    tokens: TokenService,
}

impl<U: UserStore> Authorizer<U> {
    /// Creates an authorizer backed by the given user store.
    pub fn new(users: U, tokens: TokenService) -> Self {
        Self { users, tokens }
    }

    /// Gets the token service used for signing and verification.
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Checks whether the bearer may perform `operation`.
    ///
    /// Public operations succeed with `None` without looking at the
    /// credential. Otherwise the token is verified, its user is loaded, and
    /// the user's current role is checked against the table.
    #[tracing::instrument(skip(self, bearer))]
    pub async fn authorize(
        &self,
        operation: Operation,
        bearer: Option<&str>,
    ) -> Result<Option<Identity>> {
        let access = access(operation);
        if access == Access::Public {
            return Ok(None);
        }

        let identity = match self.resolve(bearer).await {
            Ok(identity) => identity,
            Err(e) => {
                if e.is_unauthorized() {
                    metrics::counter!("auth_failures_total").increment(1);
                    tracing::debug!(error = %e, "Authentication failed");
                }
                return Err(e);
            }
        };

        if !access.permits(identity.role) {
            metrics::counter!("auth_failures_total").increment(1);
            tracing::warn!(
                username = %identity.username,
                role = %identity.role,
                "Role not permitted for operation"
            );
            return Err(AuthError::Forbidden {
                operation,
                role: identity.role,
            });
        }

        Ok(Some(identity))
    }

    /// Like [`authorize`](Self::authorize) but always yields an identity,
    /// resolving the bearer even for public operations.
    pub async fn require(&self, operation: Operation, bearer: Option<&str>) -> Result<Identity> {
        match self.authorize(operation, bearer).await? {
            Some(identity) => Ok(identity),
            None => self.resolve(bearer).await,
        }
    }

    async fn resolve(&self, bearer: Option<&str>) -> Result<Identity> {
        let token = bearer.ok_or(AuthError::MissingCredential)?;
        let claims = self.tokens.verify(token)?;
        let user = self
            .users
            .find_user_by_username(&claims.username)
            .await?
            .ok_or(AuthError::UnknownUser)?;

        Ok(Identity {
            id: user.id,
            username: user.username,
            role: user.role,
        })
    }
}
