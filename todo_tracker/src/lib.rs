//! # Todo Tracker
//!
//! Domain library for a multi-user todo tracking service.
//!
//! Users register, activate their account with a one-time token and then
//! exchange their credentials for a bearer token. Todos follow the todo.txt
//! conventions and are updated under optimistic concurrency: every record
//! carries a version, and a write only lands if the version is unchanged.
//!
//! ## Core Modules
//!
//! - [`auth`]: Registration, activation and credential checks
//! - [`db`]: Repository traits with PostgreSQL and in-memory implementations
//! - [`tokens`]: Token generation, hashing and scopes
//! - [`todos`]: Todo records, validation and the todo.txt line parser
//! - [`filters`]: Listing filters and pagination
//!
//! ## Example
//!
//! ```
//! use todo_tracker::todos::parse_todo;
//!
//! let todo = parse_todo("(A) call mom @phone +family");
//! assert_eq!(todo.priority, "A");
//! assert_eq!(todo.contexts, vec!["phone"]);
//! ```

pub mod auth;
pub mod db;
pub mod errors;
pub mod filters;
pub mod mailer;
pub mod permissions;
pub mod todos;
pub mod tokens;
pub mod users;
pub mod validator;

pub use errors::{DataError, DataResult};
pub use users::{Identity, User, UserId};
