//! User accounts: registration, login and self-service profile changes.

use auth::{Identity, IssuedToken, TokenService, hash_password, verify_password};
use chrono::{DateTime, Utc};
use common::{Role, UserId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use store::{AuditAction, NewUser, StoreError, User, UserChanges, UserStore};

use crate::audit::{self, entity};
use crate::error::{DomainError, Result};
use crate::validation::ValidationErrors;

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 50;
const PASSWORD_MIN: usize = 8;

/// Username and password as submitted to register or login.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePassword {
    pub current_password: String,
    pub new_password: String,
}

impl std::fmt::Debug for ChangePassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangePassword").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeUsername {
    pub username: String,
}

/// Public view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

fn check_username(errors: &mut ValidationErrors, field: &str, username: &str) {
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        errors.add(
            field,
            format_args!("must be between {USERNAME_MIN} and {USERNAME_MAX} characters"),
        );
    } else if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        errors.add(field, "may only contain letters, digits, '_', '.' and '-'");
    }
}

fn check_password(errors: &mut ValidationErrors, field: &str, password: &str) {
    if password.chars().count() < PASSWORD_MIN {
        errors.add(field, format_args!("must be at least {PASSWORD_MIN} characters"));
    }
}

fn username_conflict(e: StoreError) -> DomainError {
    match e {
        StoreError::Conflict(_) => DomainError::Conflict("Username already exists".to_string()),
        other => other.into(),
    }
}

fn invalid_credentials() -> DomainError {
    metrics::counter!("auth_failures_total").increment(1);
    DomainError::Unauthorized("Invalid username or password".to_string())
}

/// Service for user accounts.
pub struct UserService<S: UserStore> {
    store: S,
    tokens: TokenService,
}

impl<S: UserStore> UserService<S> {
    pub fn new(store: S, tokens: TokenService) -> Self {
        Self { store, tokens }
    }

    /// Registers a user with role `user`.
    #[tracing::instrument(skip(self))]
    pub async fn register(&self, input: Credentials) -> Result<UserProfile> {
        self.create(input, Role::User).await
    }

    /// Creates the admin account unless the username is already taken.
    /// Returns true when an account was created.
    #[tracing::instrument(skip(self))]
    pub async fn seed_admin(&self, input: Credentials) -> Result<bool> {
        if self
            .store
            .find_user_by_username(&input.username)
            .await?
            .is_some()
        {
            return Ok(false);
        }
        self.create(input, Role::Admin).await?;
        Ok(true)
    }

    async fn create(&self, input: Credentials, role: Role) -> Result<UserProfile> {
        let mut errors = ValidationErrors::new();
        check_username(&mut errors, "username", &input.username);
        check_password(&mut errors, "password", &input.password);
        errors.into_result()?;

        let password_hash = hash_password(&input.password)?;
        let changes = json!({ "username": input.username, "role": role });
        let audit = audit::entry(
            entity::USER,
            AuditAction::Create,
            changes,
            Some(input.username.as_str()),
        );
        let user = self
            .store
            .insert_user(
                NewUser {
                    username: input.username,
                    password_hash,
                    role,
                },
                audit,
            )
            .await
            .map_err(username_conflict)?;
        audit::recorded(entity::USER);

        tracing::info!(user_id = %user.id, role = %user.role, "User registered");
        Ok(user.into())
    }

    /// Exchanges credentials for a bearer token. Unknown user and wrong
    /// password fail identically.
    #[tracing::instrument(skip(self))]
    pub async fn login(&self, input: Credentials) -> Result<IssuedToken> {
        let Some(user) = self.store.find_user_by_username(&input.username).await? else {
            return Err(invalid_credentials());
        };
        if !verify_password(&input.password, &user.password_hash)? {
            return Err(invalid_credentials());
        }
        Ok(self.tokens.issue(user.id, &user.username, user.role)?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn profile(&self, caller: &Identity) -> Result<UserProfile> {
        self.load(caller.id).await.map(Into::into)
    }

    #[tracing::instrument(skip(self))]
    pub async fn change_password(&self, caller: &Identity, input: ChangePassword) -> Result<()> {
        let mut errors = ValidationErrors::new();
        check_password(&mut errors, "newPassword", &input.new_password);
        errors.into_result()?;

        let user = self.load(caller.id).await?;
        if !verify_password(&input.current_password, &user.password_hash)? {
            let mut errors = ValidationErrors::new();
            errors.add("currentPassword", "is incorrect");
            return Err(errors.into());
        }

        let changes = UserChanges {
            password_hash: Some(hash_password(&input.new_password)?),
            ..Default::default()
        };
        let audit = audit::entry(
            entity::USER,
            AuditAction::UpdatePassword,
            json!({}),
            Some(caller.username.as_str()),
        );
        self.store.update_user(user.id, changes, audit).await?;
        audit::recorded(entity::USER);
        Ok(())
    }

    /// Renames the caller. Tokens issued under the old name stop resolving.
    #[tracing::instrument(skip(self))]
    pub async fn change_username(
        &self,
        caller: &Identity,
        input: ChangeUsername,
    ) -> Result<UserProfile> {
        let mut errors = ValidationErrors::new();
        check_username(&mut errors, "username", &input.username);
        errors.into_result()?;

        let changes = json!({ "from": caller.username, "to": input.username });
        let audit = audit::entry(
            entity::USER,
            AuditAction::UpdateUsername,
            changes,
            Some(caller.username.as_str()),
        );
        let user = self
            .store
            .update_user(
                caller.id,
                UserChanges {
                    username: Some(input.username),
                    ..Default::default()
                },
                audit,
            )
            .await
            .map_err(username_conflict)?;
        audit::recorded(entity::USER);
        Ok(user.into())
    }

    async fn load(&self, id: UserId) -> Result<User> {
        self.store
            .find_user(id)
            .await?
            .ok_or_else(|| DomainError::not_found(entity::USER, id))
    }
}
