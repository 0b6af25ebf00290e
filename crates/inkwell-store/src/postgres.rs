//! PostgreSQL record store
//!
//! Implements the credential, author, post and notification contracts on a
//! single connection pool. Tables are described in `schema.sql`.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::FromRow;

use inkwell_core::{
    Author, AuthorStore, BlogPost, CredentialStore, DatabaseConfig, InkwellError, NewPost,
    NewUser, Notification, NotificationStore, PostStore, Result, Role, User,
};

/// SQLSTATE for a statement cancelled by `statement_timeout`
const QUERY_CANCELED: &str = "57014";

/// Compare-and-set role update: `$1` new role, `$2` user id, `$3` expected role
const UPDATE_ROLE_SQL: &str = "UPDATE users SET role = $1 WHERE id = $2 AND role = $3";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect with the configured pool size, acquire timeout and
    /// per-statement timeout
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = connect_options(config)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.postgres_pool_size)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| InkwellError::DatabaseError(format!("PostgreSQL connection failed: {e}")))?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions> {
    let options = PgConnectOptions::from_str(&config.postgres_url)
        .map_err(|e| InkwellError::ConfigError(format!("invalid DATABASE_URL: {e}")))?;
    if config.statement_timeout_secs == 0 {
        return Ok(options);
    }
    let millis = config.statement_timeout_secs.saturating_mul(1000).to_string();
    Ok(options.options([("statement_timeout", millis.as_str())]))
}

fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> InkwellError {
    move |e| {
        if is_query_canceled(&e) {
            return InkwellError::Unavailable(format!("database: {context}: statement timed out"));
        }
        match e {
            sqlx::Error::PoolTimedOut => InkwellError::Unavailable("database".to_string()),
            other => InkwellError::DatabaseError(format!("{context}: {other}")),
        }
    }
}

fn is_query_canceled(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == QUERY_CANCELED)
}

/// Page bounds as Postgres `BIGINT`, saturating instead of wrapping
fn page_bound(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = InkwellError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: row.id as u64,
            email: row.email,
            password_hash: row.password_hash,
            role: row
                .role
                .parse()
                .map_err(|_| InkwellError::DatabaseError(format!("user {} has role {:?}", row.id, row.role)))?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AuthorRow {
    id: i64,
    user_id: i64,
    created_at: DateTime<Utc>,
}

impl From<AuthorRow> for Author {
    fn from(row: AuthorRow) -> Self {
        Author {
            id: row.id as u64,
            user_id: row.user_id as u64,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct PostRow {
    id: i64,
    author_id: i64,
    title: String,
    content: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PostRow> for BlogPost {
    fn from(row: PostRow) -> Self {
        BlogPost {
            id: row.id as u64,
            author_id: row.author_id as u64,
            title: row.title,
            content: row.content,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct NotificationRow {
    id: i64,
    user_id: i64,
    message: String,
    sent: bool,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Notification {
            id: row.id as u64,
            user_id: row.user_id as u64,
            message: row.message,
            sent: row.sent,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let row: UserRow = sqlx::query_as(
            r#"
            INSERT INTO users (email, password_hash, role)
            VALUES ($1, $2, $3)
            RETURNING id, email, password_hash, role, created_at
            "#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(Role::User.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                InkwellError::Conflict("email already registered".to_string())
            } else {
                db_error("failed to create user")(e)
            }
        })?;

        row.try_into()
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<User>> {
        let Ok(id) = i64::try_from(id) else {
            return Ok(None);
        };

        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, password_hash, role, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("failed to find user"))?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, password_hash, role, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("failed to find user"))?;

        row.map(User::try_from).transpose()
    }

    async fn update_role(&self, id: u64, expected: Role, role: Role) -> Result<bool> {
        let db_id = i64::try_from(id).map_err(|_| InkwellError::NotFound("User".to_string()))?;

        let updated = sqlx::query(UPDATE_ROLE_SQL)
            .bind(role.as_str())
            .bind(db_id)
            .bind(expected.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error("failed to update role"))?
            .rows_affected();

        if updated == 1 {
            return Ok(true);
        }
        match self.find_by_id(id).await? {
            Some(_) => Ok(false),
            None => Err(InkwellError::NotFound("User".to_string())),
        }
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error("ping failed"))?;
        Ok(())
    }
}

#[async_trait]
impl AuthorStore for PgStore {
    async fn promote(&self, user_id: u64) -> Result<Author> {
        let db_id =
            i64::try_from(user_id).map_err(|_| InkwellError::NotFound("User".to_string()))?;

        // Dropping the transaction without commit rolls back.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("failed to begin promotion"))?;

        let updated = sqlx::query(UPDATE_ROLE_SQL)
            .bind(Role::Author.as_str())
            .bind(db_id)
            .bind(Role::User.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_error("failed to update role"))?
            .rows_affected();

        if updated == 0 {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1")
                .bind(db_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error("failed to find user"))?;

            return Err(match exists {
                Some(_) => InkwellError::Conflict("already an author".to_string()),
                None => InkwellError::NotFound("User".to_string()),
            });
        }

        let row: AuthorRow = sqlx::query_as(
            "INSERT INTO authors (user_id) VALUES ($1) RETURNING id, user_id, created_at",
        )
        .bind(db_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                InkwellError::Conflict("already an author".to_string())
            } else {
                db_error("failed to create author")(e)
            }
        })?;

        tx.commit()
            .await
            .map_err(db_error("failed to commit promotion"))?;

        Ok(row.into())
    }

    async fn find_by_user_id(&self, user_id: u64) -> Result<Option<Author>> {
        let Ok(user_id) = i64::try_from(user_id) else {
            return Ok(None);
        };

        let row: Option<AuthorRow> =
            sqlx::query_as("SELECT id, user_id, created_at FROM authors WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("failed to find author"))?;

        Ok(row.map(Author::from))
    }
}

#[async_trait]
impl PostStore for PgStore {
    async fn create_post(&self, post: NewPost) -> Result<BlogPost> {
        let author_id = i64::try_from(post.author_id)
            .map_err(|_| InkwellError::NotFound("Author".to_string()))?;

        let row: PostRow = sqlx::query_as(
            r#"
            INSERT INTO posts (author_id, title, content)
            VALUES ($1, $2, $3)
            RETURNING id, author_id, title, content, created_at, updated_at
            "#,
        )
        .bind(author_id)
        .bind(&post.title)
        .bind(&post.content)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("failed to create post"))?;

        Ok(row.into())
    }

    async fn find_post(&self, id: u64) -> Result<Option<BlogPost>> {
        let Ok(id) = i64::try_from(id) else {
            return Ok(None);
        };

        let row: Option<PostRow> = sqlx::query_as(
            "SELECT id, author_id, title, content, created_at, updated_at FROM posts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("failed to find post"))?;

        Ok(row.map(BlogPost::from))
    }

    async fn list_posts(&self, limit: usize, offset: usize) -> Result<Vec<BlogPost>> {
        let rows: Vec<PostRow> = sqlx::query_as(
            r#"
            SELECT id, author_id, title, content, created_at, updated_at
            FROM posts
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(page_bound(limit))
        .bind(page_bound(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("failed to list posts"))?;

        Ok(rows.into_iter().map(BlogPost::from).collect())
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn create_notification(&self, user_id: u64, message: &str) -> Result<Notification> {
        let user_id =
            i64::try_from(user_id).map_err(|_| InkwellError::NotFound("User".to_string()))?;

        let row: NotificationRow = sqlx::query_as(
            r#"
            INSERT INTO notifications (user_id, message, sent)
            VALUES ($1, $2, FALSE)
            RETURNING id, user_id, message, sent, created_at
            "#,
        )
        .bind(user_id)
        .bind(message)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("failed to create notification"))?;

        Ok(row.into())
    }

    async fn list_for_user(&self, user_id: u64) -> Result<Vec<Notification>> {
        let Ok(user_id) = i64::try_from(user_id) else {
            return Ok(Vec::new());
        };

        let rows: Vec<NotificationRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, message, sent, created_at
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("failed to list notifications"))?;

        Ok(rows.into_iter().map(Notification::from).collect())
    }
}
