//! Authentication manager implementation.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};
use chrono::Duration;

use super::errors::{AuthError, AuthResult};
use crate::db::Store;
use crate::errors::DataError;
use crate::permissions::{PermissionCode, Permissions};
use crate::tokens::{ACTIVATION_TTL, Scope, Token, authentication_ttl, validate_token_plaintext};
use crate::users::{
    NewUser, User, UserId, validate_email, validate_password_plaintext, validate_registration,
};
use crate::validator::Validator;

const DUPLICATE_EMAIL: &str = "a user with this email address already exists";
const INVALID_ACTIVATION_TOKEN: &str = "invalid or expired token";

/// User lifecycle and credential checks on top of a [`Store`].
#[derive(Clone)]
pub struct AuthManager {
    store: Store,
    pepper: String,
    params: Params,
    authentication_ttl: Duration,
}

impl AuthManager {
    /// Create a manager using Argon2id default cost.
    ///
    /// * `pepper` - Server-side secret appended to every password before hashing
    /// * `production` - Selects the authentication token lifetime
    pub fn new(store: Store, pepper: String, production: bool) -> Self {
        Self {
            store,
            pepper,
            params: Params::default(),
            authentication_ttl: authentication_ttl(production),
        }
    }

    /// Override the Argon2 cost parameters.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Cheapest parameters argon2 accepts. Tests only.
    pub fn low_cost_params() -> Params {
        Params::new(8, 1, 1, None).unwrap_or_default()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Register a new, unactivated user.
    ///
    /// Grants `todos:read` and issues a 72h activation token; the caller is
    /// responsible for mailing the token plaintext.
    ///
    /// # Errors
    ///
    /// * `AuthError::Validation` - Bad input, or the email is already registered
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> AuthResult<(User, Token)> {
        let mut v = Validator::new();
        validate_registration(&mut v, name, email, password);
        v.finish().map_err(AuthError::Validation)?;

        let password_hash = self.hash_password(password)?;
        let new_user = NewUser {
            name: name.to_string(),
            email: email.to_string(),
            password_hash,
        };

        let user = match self.store.users.insert(&new_user).await {
            Ok(user) => user,
            Err(DataError::DuplicateEmail) => {
                return Err(AuthError::field("email", DUPLICATE_EMAIL));
            }
            Err(e) => return Err(e.into()),
        };

        self.store
            .permissions
            .add_for_user(user.id, &[PermissionCode::TodosRead])
            .await?;
        let token = self
            .store
            .tokens
            .new_token(user.id, ACTIVATION_TTL, Scope::Activation)
            .await?;

        log::info!("registered user {}", user.id);
        Ok((user, token))
    }

    /// Redeem an activation token.
    ///
    /// Every activation token the user holds is deleted, so a token works once.
    pub async fn activate(&self, plaintext: &str) -> AuthResult<User> {
        let mut v = Validator::new();
        validate_token_plaintext(&mut v, plaintext);
        v.finish().map_err(AuthError::Validation)?;

        let mut user = match self
            .store
            .users
            .get_for_token(Scope::Activation, plaintext)
            .await
        {
            Ok(user) => user,
            Err(DataError::RecordNotFound) => {
                return Err(AuthError::field("token", INVALID_ACTIVATION_TOKEN));
            }
            Err(e) => return Err(e.into()),
        };

        user.activated = true;
        match self.store.users.update(&mut user).await {
            Ok(()) => {}
            Err(DataError::EditConflict) => return Err(AuthError::EditConflict),
            Err(e) => return Err(e.into()),
        }

        self.store
            .tokens
            .delete_all_for_user(Scope::Activation, user.id)
            .await?;
        self.store
            .permissions
            .add_for_user(user.id, &[PermissionCode::TodosWrite])
            .await?;

        log::info!("activated user {}", user.id);
        Ok(user)
    }

    /// Issue a fresh activation token if `email` belongs to an unactivated user.
    ///
    /// `Ok(None)` covers both an unknown email and an already activated
    /// account; callers must not distinguish the two in their response.
    pub async fn request_activation_token(&self, email: &str) -> AuthResult<Option<(User, Token)>> {
        let mut v = Validator::new();
        validate_email(&mut v, email);
        v.finish().map_err(AuthError::Validation)?;

        let user = match self.store.users.find_by_email(email).await? {
            Some(user) if !user.activated => user,
            _ => return Ok(None),
        };

        let token = self
            .store
            .tokens
            .new_token(user.id, ACTIVATION_TTL, Scope::Activation)
            .await?;
        Ok(Some((user, token)))
    }

    /// Exchange email and password for an authentication token.
    ///
    /// # Errors
    ///
    /// * `AuthError::Validation` - Malformed email or password
    /// * `AuthError::InvalidCredentials` - Unknown email or wrong password
    pub async fn authenticate(&self, email: &str, password: &str) -> AuthResult<Token> {
        let mut v = Validator::new();
        validate_email(&mut v, email);
        validate_password_plaintext(&mut v, password);
        v.finish().map_err(AuthError::Validation)?;

        let user = self
            .store
            .users
            .find_by_email(email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let token = self
            .store
            .tokens
            .new_token(user.id, self.authentication_ttl, Scope::Authentication)
            .await?;
        Ok(token)
    }

    /// Resolve a bearer token to its user.
    ///
    /// Malformed tokens are rejected before touching the store.
    pub async fn authenticate_bearer(&self, plaintext: &str) -> AuthResult<User> {
        let mut v = Validator::new();
        validate_token_plaintext(&mut v, plaintext);
        if !v.valid() {
            return Err(AuthError::InvalidToken);
        }

        match self
            .store
            .users
            .get_for_token(Scope::Authentication, plaintext)
            .await
        {
            Ok(user) => Ok(user),
            Err(DataError::RecordNotFound) => Err(AuthError::InvalidToken),
            Err(e) => Err(e.into()),
        }
    }

    /// Permissions currently held by `user_id`
    pub async fn permissions(&self, user_id: UserId) -> AuthResult<Permissions> {
        Ok(self.store.permissions.get_all_for_user(user_id).await?)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash password with Argon2id + pepper
    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        let peppered = format!("{}{}", password, self.pepper);
        let salt = SaltString::generate(&mut OsRng);

        Ok(self
            .argon2()
            .hash_password(peppered.as_bytes(), &salt)
            .map_err(|_| AuthError::HashingFailed)?
            .to_string())
    }

    /// `Ok(false)` on mismatch; a corrupt stored hash is an error.
    pub fn verify_password(&self, password: &str, hash: &str) -> AuthResult<bool> {
        let peppered = format!("{}{}", password, self.pepper);
        let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::HashingFailed)?;

        match self.argon2().verify_password(peppered.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(_) => Err(AuthError::HashingFailed),
        }
    }
}
