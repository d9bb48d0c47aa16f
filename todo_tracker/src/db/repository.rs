//! Repository trait definitions.
//!
//! Handlers only see these traits, so the same code runs against PostgreSQL
//! ([`super::postgres`]) and the in-process store ([`super::memory`]).

use async_trait::async_trait;
use chrono::Duration;

use crate::errors::DataResult;
use crate::filters::{Filters, PaginationData};
use crate::permissions::{PermissionCode, Permissions};
use crate::todos::{NewTodo, Todo};
use crate::tokens::{Scope, Token};
use crate::users::{NewUser, User, UserId};

/// User storage
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user. Fails with `DuplicateEmail` if the email is taken
    /// (case-insensitively).
    async fn insert(&self, user: &NewUser) -> DataResult<User>;

    /// Find user by email, case-insensitively
    async fn find_by_email(&self, email: &str) -> DataResult<Option<User>>;

    /// Persist `user`, bumping its version. `user.version` is the version the
    /// caller read; a mismatch fails with `EditConflict`.
    async fn update(&self, user: &mut User) -> DataResult<()>;

    /// Resolve a plaintext token of the given scope to its owner.
    ///
    /// Unknown, expired and wrong-scope tokens all fail with `RecordNotFound`.
    async fn get_for_token(&self, scope: Scope, plaintext: &str) -> DataResult<User>;
}

/// Token storage
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Store a token digest
    async fn insert(&self, token: &Token) -> DataResult<()>;

    /// Delete every token of `scope` owned by `user_id`
    async fn delete_all_for_user(&self, scope: Scope, user_id: UserId) -> DataResult<()>;

    /// Generate a token and store its digest
    async fn new_token(&self, user_id: UserId, ttl: Duration, scope: Scope) -> DataResult<Token> {
        let token = Token::generate(user_id, ttl, scope);
        self.insert(&token).await?;
        Ok(token)
    }
}

/// Permission storage
#[async_trait]
pub trait PermissionRepository: Send + Sync {
    /// All permissions held by a user
    async fn get_all_for_user(&self, user_id: UserId) -> DataResult<Permissions>;

    /// Grant permissions; already-held codes are ignored
    async fn add_for_user(&self, user_id: UserId, codes: &[PermissionCode]) -> DataResult<()>;
}

/// Todo storage. Every operation is scoped to the owning user.
#[async_trait]
pub trait TodoRepository: Send + Sync {
    /// Insert a todo with version 1
    async fn insert(&self, user_id: UserId, todo: &NewTodo) -> DataResult<Todo>;

    /// Fetch a todo owned by `user_id`
    async fn get(&self, id: i64, user_id: UserId) -> DataResult<Todo>;

    /// List todos owned by `user_id` whose text contains `text`
    async fn get_all(
        &self,
        user_id: UserId,
        text: &str,
        filters: &Filters,
    ) -> DataResult<(Vec<Todo>, PaginationData)>;

    /// Persist `todo` if its stored version still equals `todo.version`.
    /// On success `todo.version` holds the new version.
    async fn update(&self, todo: &mut Todo) -> DataResult<()>;

    /// Delete a todo owned by `user_id`
    async fn delete(&self, id: i64, user_id: UserId) -> DataResult<()>;
}
