//! In-process store used by `--in-memory` servers and by tests.
//!
//! One `MemoryStore` implements every repository trait over a single lock, so
//! a clone of the `Arc` can be handed out as each trait object.

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use subtle::ConstantTimeEq;

use super::repository::{PermissionRepository, TodoRepository, TokenRepository, UserRepository};
use crate::errors::{DataError, DataResult};
use crate::filters::{ArchivedFilter, CompletedFilter, Filters, PaginationData, SortColumn};
use crate::permissions::{PermissionCode, Permissions};
use crate::todos::{NewTodo, Todo};
use crate::tokens::{Scope, Token, hash_plaintext};
use crate::users::{NewUser, User, UserId};

#[derive(Default)]
struct Inner {
    users: BTreeMap<UserId, User>,
    next_user_id: UserId,
    tokens: Vec<Token>,
    permissions: HashMap<UserId, HashSet<PermissionCode>>,
    todos: BTreeMap<i64, Todo>,
    next_todo_id: i64,
}

/// Mutex-guarded maps standing in for the PostgreSQL tables
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock only means another task panicked mid-call; the maps
    // are still structurally valid.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of stored tokens of `scope` for `user_id`
    pub fn token_count(&self, scope: Scope, user_id: UserId) -> usize {
        self.lock()
            .tokens
            .iter()
            .filter(|t| t.scope == scope && t.user_id == user_id)
            .count()
    }
}

fn now() -> chrono::DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert(&self, user: &NewUser) -> DataResult<User> {
        let mut inner = self.lock();
        if inner
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(DataError::DuplicateEmail);
        }

        inner.next_user_id += 1;
        let record = User {
            id: inner.next_user_id,
            created_at: now(),
            name: user.name.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            activated: false,
            version: 1,
        };
        inner.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_email(&self, email: &str) -> DataResult<Option<User>> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update(&self, user: &mut User) -> DataResult<()> {
        let mut inner = self.lock();
        let taken = inner
            .users
            .values()
            .any(|u| u.id != user.id && u.email.eq_ignore_ascii_case(&user.email));
        if taken {
            return Err(DataError::DuplicateEmail);
        }

        match inner.users.get_mut(&user.id) {
            Some(stored) if stored.version == user.version => {
                user.version += 1;
                *stored = user.clone();
                Ok(())
            }
            _ => Err(DataError::EditConflict),
        }
    }

    async fn get_for_token(&self, scope: Scope, plaintext: &str) -> DataResult<User> {
        let hash = hash_plaintext(plaintext);
        let now = Utc::now();
        let inner = self.lock();

        let user_id = inner
            .tokens
            .iter()
            .find(|t| {
                t.scope == scope
                    && t.expiry > now
                    && bool::from(t.hash.as_slice().ct_eq(hash.as_slice()))
            })
            .map(|t| t.user_id)
            .ok_or(DataError::RecordNotFound)?;

        inner
            .users
            .get(&user_id)
            .cloned()
            .ok_or(DataError::RecordNotFound)
    }
}

#[async_trait]
impl TokenRepository for MemoryStore {
    async fn insert(&self, token: &Token) -> DataResult<()> {
        self.lock().tokens.push(token.clone());
        Ok(())
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: UserId) -> DataResult<()> {
        self.lock()
            .tokens
            .retain(|t| !(t.scope == scope && t.user_id == user_id));
        Ok(())
    }
}

#[async_trait]
impl PermissionRepository for MemoryStore {
    async fn get_all_for_user(&self, user_id: UserId) -> DataResult<Permissions> {
        let inner = self.lock();
        let mut codes: Vec<PermissionCode> = inner
            .permissions
            .get(&user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        codes.sort_by_key(|c| c.as_str());
        Ok(Permissions::new(codes))
    }

    async fn add_for_user(&self, user_id: UserId, codes: &[PermissionCode]) -> DataResult<()> {
        self.lock()
            .permissions
            .entry(user_id)
            .or_default()
            .extend(codes.iter().copied());
        Ok(())
    }
}

fn archived_matches(filter: ArchivedFilter, archived: bool) -> bool {
    match filter {
        ArchivedFilter::Unarchived => !archived,
        ArchivedFilter::Archived => archived,
        ArchivedFilter::Any => true,
    }
}

fn completed_matches(filter: CompletedFilter, completed: bool) -> bool {
    match filter {
        CompletedFilter::Done => completed,
        CompletedFilter::Undone => !completed,
        CompletedFilter::Any => true,
    }
}

#[async_trait]
impl TodoRepository for MemoryStore {
    async fn insert(&self, user_id: UserId, todo: &NewTodo) -> DataResult<Todo> {
        let mut inner = self.lock();
        inner.next_todo_id += 1;
        let record = Todo {
            id: inner.next_todo_id,
            user_id,
            created_at: now(),
            text: todo.text.clone(),
            contexts: todo.contexts.clone(),
            projects: todo.projects.clone(),
            priority: todo.priority.clone(),
            completed: todo.completed,
            archived: todo.archived,
            version: 1,
        };
        inner.todos.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: i64, user_id: UserId) -> DataResult<Todo> {
        self.lock()
            .todos
            .get(&id)
            .filter(|t| t.user_id == user_id)
            .cloned()
            .ok_or(DataError::RecordNotFound)
    }

    async fn get_all(
        &self,
        user_id: UserId,
        text: &str,
        filters: &Filters,
    ) -> DataResult<(Vec<Todo>, PaginationData)> {
        let needle = text.to_lowercase();
        let archived = filters.archived();
        let completed = filters.completed();

        let mut matching: Vec<Todo> = self
            .lock()
            .todos
            .values()
            .filter(|t| t.user_id == user_id)
            .filter(|t| needle.is_empty() || t.text.to_lowercase().contains(&needle))
            .filter(|t| archived_matches(archived, t.archived))
            .filter(|t| completed_matches(completed, t.completed))
            .cloned()
            .collect();

        let column = filters.sort_column();
        let descending = filters.sort_descending();
        matching.sort_by(|a, b| {
            let primary = match column {
                SortColumn::Id => a.id.cmp(&b.id),
                SortColumn::Text => a.text.cmp(&b.text),
            };
            let primary = if descending { primary.reverse() } else { primary };
            primary.then(a.id.cmp(&b.id))
        });

        let total = matching.len() as i64;
        let page: Vec<Todo> = matching
            .into_iter()
            .skip(filters.offset().max(0) as usize)
            .take(filters.limit().max(0) as usize)
            .collect();

        Ok((
            page,
            PaginationData::calculate(total, filters.page, filters.page_size),
        ))
    }

    async fn update(&self, todo: &mut Todo) -> DataResult<()> {
        let mut inner = self.lock();
        match inner.todos.get_mut(&todo.id) {
            Some(stored) if stored.user_id == todo.user_id && stored.version == todo.version => {
                todo.version += 1;
                *stored = todo.clone();
                Ok(())
            }
            _ => Err(DataError::EditConflict),
        }
    }

    async fn delete(&self, id: i64, user_id: UserId) -> DataResult<()> {
        let mut inner = self.lock();
        match inner.todos.get(&id) {
            Some(t) if t.user_id == user_id => {
                inner.todos.remove(&id);
                Ok(())
            }
            _ => Err(DataError::RecordNotFound),
        }
    }
}
