//! Authentication: registration, activation and credential checks.
//!
//! Passwords are hashed with Argon2id plus a server-side pepper. Tokens are
//! opaque random strings; only their SHA-256 digests are stored.
//!
//! ## Example
//!
//! ```no_run
//! use todo_tracker::auth::AuthManager;
//! use todo_tracker::db::Store;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let auth = AuthManager::new(Store::in_memory(), "secret_pepper".to_string(), false);
//!
//!     let (user, activation) = auth
//!         .register("Alice", "alice@example.com", "pa55word")
//!         .await?;
//!     auth.activate(&activation.plaintext).await?;
//!
//!     let token = auth.authenticate("alice@example.com", "pa55word").await?;
//!     println!("user {} authenticated until {}", user.id, token.expiry);
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod manager;

pub use errors::{AuthError, AuthResult};
pub use manager::AuthManager;
