//! PostgreSQL implementations of the repository traits.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::time::{Duration, Instant};

use super::repository::{PermissionRepository, TodoRepository, TokenRepository, UserRepository};
use super::timeouts::with_timeout;
use crate::errors::{DataError, DataResult};
use crate::filters::{ArchivedFilter, CompletedFilter, Filters, PaginationData};
use crate::permissions::{PermissionCode, Permissions};
use crate::todos::{NewTodo, Todo};
use crate::tokens::{Scope, Token, hash_plaintext};
use crate::users::{NewUser, User, UserId};

/// Queries slower than this are logged at warn level.
const SLOW_QUERY: Duration = Duration::from_millis(100);

fn log_query(operation: &str, started: Instant) {
    let elapsed = started.elapsed();
    if elapsed > SLOW_QUERY {
        log::warn!("slow query: {} took {:?}", operation, elapsed);
    } else {
        log::debug!("query {} took {:?}", operation, elapsed);
    }
}

/// Escape `LIKE` metacharacters so the text filter matches literally.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn user_from_row(r: &PgRow) -> User {
    User {
        id: r.get("id"),
        created_at: r.get("created_at"),
        name: r.get("name"),
        email: r.get("email"),
        password_hash: r.get("password_hash"),
        activated: r.get("activated"),
        version: r.get("version"),
    }
}

fn todo_from_row(r: &PgRow) -> Todo {
    Todo {
        id: r.get("id"),
        user_id: r.get("user_id"),
        created_at: r.get("created_at"),
        text: r.get("text"),
        contexts: r.get("contexts"),
        projects: r.get("projects"),
        priority: r.get("priority"),
        completed: r.get("completed"),
        archived: r.get("archived"),
        version: r.get("version"),
    }
}

/// PostgreSQL implementation of `UserRepository`
pub struct PgUserRepository {
    pool: PgPool,
    timeout: Duration,
}

impl PgUserRepository {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn insert(&self, user: &NewUser) -> DataResult<User> {
        let started = Instant::now();
        let row = with_timeout(
            self.timeout,
            sqlx::query(
                r#"
                INSERT INTO users (name, email, password_hash, activated)
                VALUES ($1, $2, $3, FALSE)
                RETURNING id, created_at, name, email::text AS email, password_hash, activated, version
                "#,
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .fetch_one(&self.pool),
        )
        .await?;
        log_query("users.insert", started);

        Ok(user_from_row(&row))
    }

    async fn find_by_email(&self, email: &str) -> DataResult<Option<User>> {
        let started = Instant::now();
        let row = with_timeout(
            self.timeout,
            sqlx::query(
                r#"
                SELECT id, created_at, name, email::text AS email, password_hash, activated, version
                FROM users
                WHERE email = $1::citext
                "#,
            )
            .bind(email)
            .fetch_optional(&self.pool),
        )
        .await?;
        log_query("users.find_by_email", started);

        Ok(row.as_ref().map(user_from_row))
    }

    async fn update(&self, user: &mut User) -> DataResult<()> {
        let started = Instant::now();
        let row = with_timeout(
            self.timeout,
            sqlx::query(
                r#"
                UPDATE users
                SET name = $1, email = $2, password_hash = $3, activated = $4, version = version + 1
                WHERE id = $5 AND version = $6
                RETURNING version
                "#,
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.activated)
            .bind(user.id)
            .bind(user.version)
            .fetch_optional(&self.pool),
        )
        .await?;
        log_query("users.update", started);

        let row = row.ok_or(DataError::EditConflict)?;
        user.version = row.get("version");
        Ok(())
    }

    async fn get_for_token(&self, scope: Scope, plaintext: &str) -> DataResult<User> {
        let started = Instant::now();
        let hash = hash_plaintext(plaintext);
        let row = with_timeout(
            self.timeout,
            sqlx::query(
                r#"
                SELECT users.id, users.created_at, users.name, users.email::text AS email,
                       users.password_hash, users.activated, users.version
                FROM users
                INNER JOIN tokens ON users.id = tokens.user_id
                WHERE tokens.hash = $1
                AND tokens.scope = $2
                AND tokens.expiry > $3
                "#,
            )
            .bind(hash)
            .bind(scope.as_str())
            .bind(Utc::now())
            .fetch_optional(&self.pool),
        )
        .await?;
        log_query("users.get_for_token", started);

        row.as_ref()
            .map(user_from_row)
            .ok_or(DataError::RecordNotFound)
    }
}

/// PostgreSQL implementation of `TokenRepository`
pub struct PgTokenRepository {
    pool: PgPool,
    timeout: Duration,
}

impl PgTokenRepository {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl TokenRepository for PgTokenRepository {
    async fn insert(&self, token: &Token) -> DataResult<()> {
        with_timeout(
            self.timeout,
            sqlx::query(
                "INSERT INTO tokens (hash, user_id, expiry, scope) VALUES ($1, $2, $3, $4)",
            )
            .bind(&token.hash)
            .bind(token.user_id)
            .bind(token.expiry)
            .bind(token.scope.as_str())
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: UserId) -> DataResult<()> {
        with_timeout(
            self.timeout,
            sqlx::query("DELETE FROM tokens WHERE scope = $1 AND user_id = $2")
                .bind(scope.as_str())
                .bind(user_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}

/// PostgreSQL implementation of `PermissionRepository`
pub struct PgPermissionRepository {
    pool: PgPool,
    timeout: Duration,
}

impl PgPermissionRepository {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl PermissionRepository for PgPermissionRepository {
    async fn get_all_for_user(&self, user_id: UserId) -> DataResult<Permissions> {
        let rows = with_timeout(
            self.timeout,
            sqlx::query(
                r#"
                SELECT permissions.code
                FROM permissions
                INNER JOIN users_permissions ON users_permissions.permission_id = permissions.id
                WHERE users_permissions.user_id = $1
                "#,
            )
            .bind(user_id)
            .fetch_all(&self.pool),
        )
        .await?;

        Ok(rows
            .iter()
            .filter_map(|r| r.get::<String, _>("code").parse::<PermissionCode>().ok())
            .collect())
    }

    async fn add_for_user(&self, user_id: UserId, codes: &[PermissionCode]) -> DataResult<()> {
        let codes: Vec<&str> = codes.iter().map(PermissionCode::as_str).collect();
        with_timeout(
            self.timeout,
            sqlx::query(
                r#"
                INSERT INTO users_permissions
                SELECT $1, permissions.id FROM permissions WHERE permissions.code = ANY($2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(codes)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}

/// PostgreSQL implementation of `TodoRepository`
pub struct PgTodoRepository {
    pool: PgPool,
    timeout: Duration,
}

impl PgTodoRepository {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl TodoRepository for PgTodoRepository {
    async fn insert(&self, user_id: UserId, todo: &NewTodo) -> DataResult<Todo> {
        let started = Instant::now();
        let row = with_timeout(
            self.timeout,
            sqlx::query(
                r#"
                INSERT INTO todos (user_id, text, contexts, projects, priority, completed, archived)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id, user_id, created_at, text, contexts, projects, priority,
                          completed, archived, version
                "#,
            )
            .bind(user_id)
            .bind(&todo.text)
            .bind(&todo.contexts)
            .bind(&todo.projects)
            .bind(&todo.priority)
            .bind(todo.completed)
            .bind(todo.archived)
            .fetch_one(&self.pool),
        )
        .await?;
        log_query("todos.insert", started);

        Ok(todo_from_row(&row))
    }

    async fn get(&self, id: i64, user_id: UserId) -> DataResult<Todo> {
        if id < 1 {
            return Err(DataError::RecordNotFound);
        }

        let row = with_timeout(
            self.timeout,
            sqlx::query(
                r#"
                SELECT id, user_id, created_at, text, contexts, projects, priority,
                       completed, archived, version
                FROM todos
                WHERE id = $1 AND user_id = $2
                "#,
            )
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool),
        )
        .await?;

        row.as_ref()
            .map(todo_from_row)
            .ok_or(DataError::RecordNotFound)
    }

    async fn get_all(
        &self,
        user_id: UserId,
        text: &str,
        filters: &Filters,
    ) -> DataResult<(Vec<Todo>, PaginationData)> {
        let started = Instant::now();

        let archived = match filters.archived() {
            ArchivedFilter::Unarchived => Some(false),
            ArchivedFilter::Archived => Some(true),
            ArchivedFilter::Any => None,
        };
        let completed = match filters.completed() {
            CompletedFilter::Done => Some(true),
            CompletedFilter::Undone => Some(false),
            CompletedFilter::Any => None,
        };

        // Column and direction come from the safelist, never from raw input.
        let query = format!(
            r#"
            SELECT count(*) OVER() AS total_records, id, user_id, created_at, text, contexts,
                   projects, priority, completed, archived, version
            FROM todos
            WHERE user_id = $1
            AND (text ILIKE '%' || $2 || '%' ESCAPE '\' OR $2 = '')
            AND ($3::boolean IS NULL OR archived = $3)
            AND ($4::boolean IS NULL OR completed = $4)
            ORDER BY {} {}, id ASC
            LIMIT $5 OFFSET $6
            "#,
            filters.sort_column().as_sql(),
            filters.sort_direction()
        );

        let rows = with_timeout(
            self.timeout,
            sqlx::query(&query)
                .bind(user_id)
                .bind(escape_like(text))
                .bind(archived)
                .bind(completed)
                .bind(filters.limit())
                .bind(filters.offset())
                .fetch_all(&self.pool),
        )
        .await?;
        log_query("todos.get_all", started);

        let total_records = rows
            .first()
            .map(|r| r.get::<i64, _>("total_records"))
            .unwrap_or(0);
        let todos = rows.iter().map(todo_from_row).collect();

        Ok((
            todos,
            PaginationData::calculate(total_records, filters.page, filters.page_size),
        ))
    }

    async fn update(&self, todo: &mut Todo) -> DataResult<()> {
        let started = Instant::now();
        let row = with_timeout(
            self.timeout,
            sqlx::query(
                r#"
                UPDATE todos
                SET text = $1, contexts = $2, projects = $3, priority = $4,
                    completed = $5, archived = $6, version = version + 1
                WHERE id = $7 AND user_id = $8 AND version = $9
                RETURNING version
                "#,
            )
            .bind(&todo.text)
            .bind(&todo.contexts)
            .bind(&todo.projects)
            .bind(&todo.priority)
            .bind(todo.completed)
            .bind(todo.archived)
            .bind(todo.id)
            .bind(todo.user_id)
            .bind(todo.version)
            .fetch_optional(&self.pool),
        )
        .await?;
        log_query("todos.update", started);

        let row = row.ok_or(DataError::EditConflict)?;
        todo.version = row.get("version");
        Ok(())
    }

    async fn delete(&self, id: i64, user_id: UserId) -> DataResult<()> {
        if id < 1 {
            return Err(DataError::RecordNotFound);
        }

        let result = with_timeout(
            self.timeout,
            sqlx::query("DELETE FROM todos WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 {
            return Err(DataError::RecordNotFound);
        }
        Ok(())
    }
}
