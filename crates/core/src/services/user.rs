//! User service.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::Utc;
use sea_orm::Set;
use serde::Deserialize;
use tracing::info;
use validator::Validate;
use webpolls_common::{AppError, AppResult, generate_token};
use webpolls_db::{entities::user, repositories::UserRepository};

/// User service for business logic.
#[derive(Clone)]
pub struct UserService {
    user_repo: UserRepository,
}

/// Input for creating a new user.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserInput {
    #[validate(length(min = 1, max = 64))]
    pub username: String,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

/// Input for updating a user. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserInput {
    #[validate(length(min = 1, max = 64))]
    pub username: Option<String>,

    #[validate(email)]
    pub email: Option<String>,

    #[validate(length(min = 8, max = 128))]
    pub password: Option<String>,
}

impl UserService {
    /// Create a new user service.
    #[must_use]
    pub const fn new(user_repo: UserRepository) -> Self {
        Self { user_repo }
    }

    /// Register a new user with a fresh session token.
    pub async fn create(&self, input: CreateUserInput) -> AppResult<user::Model> {
        input.validate()?;

        let username = input.username.trim().to_string();
        let email = input.email.trim().to_lowercase();

        self.ensure_username_free(&username, None).await?;
        self.ensure_email_free(&email, None).await?;

        let password_hash = hash_password(&input.password)?;

        let model = user::ActiveModel {
            username: Set(username),
            email: Set(email),
            password_hash: Set(password_hash),
            token: Set(Some(generate_token())),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        };

        let user = self.user_repo.create(model).await?;
        info!(user_id = user.id, username = %user.username, "User registered");

        Ok(user)
    }

    /// Get a user by ID.
    pub async fn get(&self, id: i32) -> AppResult<user::Model> {
        self.user_repo.get_by_id(id).await
    }

    /// Authenticate a user by session token.
    pub async fn authenticate_by_token(&self, token: &str) -> AppResult<user::Model> {
        self.user_repo
            .find_by_token(token)
            .await?
            .ok_or(AppError::Unauthorized)
    }

    /// Authenticate a user by username and password.
    ///
    /// Issues a token if the account has none (after sign-out).
    pub async fn authenticate(&self, username: &str, password: &str) -> AppResult<user::Model> {
        let user = self
            .user_repo
            .find_by_username(username.trim())
            .await?
            .ok_or(AppError::Unauthorized)?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AppError::Unauthorized);
        }

        if user.token.is_some() {
            return Ok(user);
        }
        self.regenerate_token(user.id).await
    }

    /// Replace the user's session token, invalidating the old one.
    pub async fn regenerate_token(&self, id: i32) -> AppResult<user::Model> {
        let user = self.user_repo.get_by_id(id).await?;

        let mut active: user::ActiveModel = user.into();
        active.token = Set(Some(generate_token()));
        active.updated_at = Set(Some(Utc::now().into()));

        self.user_repo.update(active).await
    }

    /// Update username, email or password.
    pub async fn update(&self, id: i32, input: UpdateUserInput) -> AppResult<user::Model> {
        input.validate()?;

        let user = self.user_repo.get_by_id(id).await?;
        let mut active: user::ActiveModel = user.into();

        if let Some(username) = input.username {
            let username = username.trim().to_string();
            self.ensure_username_free(&username, Some(id)).await?;
            active.username = Set(username);
        }

        if let Some(email) = input.email {
            let email = email.trim().to_lowercase();
            self.ensure_email_free(&email, Some(id)).await?;
            active.email = Set(email);
        }

        if let Some(password) = input.password {
            active.password_hash = Set(hash_password(&password)?);
        }

        active.updated_at = Set(Some(Utc::now().into()));

        self.user_repo.update(active).await
    }

    /// Delete a user together with their polls and votes.
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        self.user_repo.delete(id).await?;
        info!(user_id = id, "User deleted");
        Ok(())
    }

    async fn ensure_username_free(&self, username: &str, owner: Option<i32>) -> AppResult<()> {
        match self.user_repo.find_by_username(username).await? {
            Some(existing) if Some(existing.id) != owner => {
                Err(AppError::Conflict("Username already taken".to_string()))
            }
            _ => Ok(()),
        }
    }

    async fn ensure_email_free(&self, email: &str, owner: Option<i32>) -> AppResult<()> {
        match self.user_repo.find_by_email(email).await? {
            Some(existing) if Some(existing.id) != owner => {
                Err(AppError::Conflict("Email already registered".to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// Hash a password using Argon2.
fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {e}")))
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| AppError::Internal(format!("Invalid hash: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::test_support::TestContext;

    fn signup(username: &str, email: &str) -> CreateUserInput {
        CreateUserInput {
            username: username.to_string(),
            email: email.to_string(),
            password: "correct horse".to_string(),
        }
    }

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("secret-password").unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("secret-password", &hash).unwrap());
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[test]
    fn test_create_input_validation() {
        assert!(signup("alice", "alice@example.com").validate().is_ok());
        assert!(signup("", "alice@example.com").validate().is_err());
        assert!(signup("alice", "not-an-email").validate().is_err());

        let mut short = signup("alice", "alice@example.com");
        short.password = "short".to_string();
        assert!(short.validate().is_err());
    }

    #[tokio::test]
    async fn test_create_and_authenticate() {
        let ctx = TestContext::new().await;
        let service = ctx.user_service();

        let user = service.create(signup("alice", "Alice@Example.com")).await.unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert!(user.token.is_some());
        assert_ne!(user.password_hash, "correct horse");

        let signed_in = service.authenticate("alice", "correct horse").await.unwrap();
        assert_eq!(signed_in.id, user.id);

        let by_token = service
            .authenticate_by_token(user.token.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(by_token.id, user.id);
    }

    #[tokio::test]
    async fn test_wrong_credentials_are_unauthorized() {
        let ctx = TestContext::new().await;
        let service = ctx.user_service();
        service.create(signup("alice", "alice@example.com")).await.unwrap();

        assert!(matches!(
            service.authenticate("alice", "wrong password").await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            service.authenticate("nobody", "correct horse").await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            service.authenticate_by_token("bogus").await,
            Err(AppError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_username_or_email_conflicts() {
        let ctx = TestContext::new().await;
        let service = ctx.user_service();
        service.create(signup("alice", "alice@example.com")).await.unwrap();

        assert!(matches!(
            service.create(signup("alice", "other@example.com")).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            service.create(signup("bob", "ALICE@example.com")).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_signups_for_one_name() {
        let ctx = TestContext::new().await;
        let service = ctx.user_service();

        let mut handles = Vec::new();
        for i in 0..5 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .create(signup("alice", &format!("alice{i}@example.com")))
                    .await
            }));
        }

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert!(matches!(e, AppError::Conflict(_)), "{e:?}"),
            }
        }
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_regenerate_token_invalidates_old_one() {
        let ctx = TestContext::new().await;
        let service = ctx.user_service();
        let user = service.create(signup("alice", "alice@example.com")).await.unwrap();
        let old = user.token.clone().unwrap();

        let rotated = service.regenerate_token(user.id).await.unwrap();

        assert_ne!(rotated.token.as_deref(), Some(old.as_str()));
        assert!(matches!(
            service.authenticate_by_token(&old).await,
            Err(AppError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_update_checks_uniqueness() {
        let ctx = TestContext::new().await;
        let service = ctx.user_service();
        let alice = service.create(signup("alice", "alice@example.com")).await.unwrap();
        service.create(signup("bob", "bob@example.com")).await.unwrap();

        let taken = UpdateUserInput {
            username: Some("bob".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            service.update(alice.id, taken).await,
            Err(AppError::Conflict(_))
        ));

        let same = UpdateUserInput {
            username: Some("alice".to_string()),
            email: Some("alice@example.org".to_string()),
            password: Some("another password".to_string()),
        };
        let updated = service.update(alice.id, same).await.unwrap();
        assert_eq!(updated.email, "alice@example.org");
        assert!(updated.updated_at.is_some());
        assert!(service.authenticate("alice", "another password").await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_removes_polls_and_votes() {
        let ctx = TestContext::new().await;
        let service = ctx.user_service();
        let alice = ctx.user("alice").await;
        let bob = ctx.user("bob").await;
        let (alice_poll, alice_options) = ctx.poll(alice, "Alice?", &["a", "b"]).await;
        let (bob_poll, bob_options) = ctx.poll(bob, "Bob?", &["c", "d"]).await;

        ctx.votes().cast(alice_poll, alice_options[0], bob).await.unwrap();
        ctx.votes().cast(bob_poll, bob_options[1], alice).await.unwrap();

        service.delete(alice).await.unwrap();

        assert!(matches!(service.get(alice).await, Err(AppError::NotFound(_))));
        assert!(ctx.polls().find_by_id(alice_poll).await.unwrap().is_none());
        let remaining = ctx.aggregation().poll_result(bob_poll, None).await.unwrap();
        assert_eq!(remaining.total_votes, 0);
        assert!(matches!(service.delete(alice).await, Err(AppError::NotFound(_))));
    }
}
