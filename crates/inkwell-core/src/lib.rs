//! Inkwell Core - Domain models, store contracts, and shared types
//!
//! This crate defines the core abstractions used throughout the Inkwell services:
//! - Identity model (users, roles, authors)
//! - Blog posts, notifications and the `PostCreated` event
//! - Common error types
//! - Store traits consumed by the API (credentials, authors, posts,
//!   notifications, sessions, event publishing)
//! - Configuration management
//! - In-memory store implementations for development and tests

pub mod config;
pub mod memory;

pub use config::{
    AppConfig, ConfigError, DatabaseConfig, EventsConfig, JwtConfig, LoggingConfig,
    ServerConfig, SessionConfig,
};
pub use memory::{MemoryEventBus, MemorySessionStore, MemoryStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for Inkwell operations
#[derive(Error, Debug)]
pub enum InkwellError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("{0} unavailable")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, InkwellError>;

// ============================================================================
// Identity
// ============================================================================

/// User role
///
/// The only transition is `User -> Author`; there is no demotion path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Author,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Author => "AUTHOR",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = InkwellError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "USER" => Ok(Role::User),
            "AUTHOR" => Ok(Role::Author),
            other => Err(InkwellError::ValidationError(format!("unknown role: {other}"))),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User account as held by the credential store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub email: String,
    /// Argon2id PHC string, never serialized into responses
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Data required to create a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
}

/// Author side record, created exactly once per promoted user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Author {
    pub id: u64,
    pub user_id: u64,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Blog & Notifications
// ============================================================================

/// Published blog post
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BlogPost {
    pub id: u64,
    pub author_id: u64,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: u64,
    pub title: String,
    pub content: String,
}

/// Notification addressed to a single user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: u64,
    pub user_id: u64,
    pub message: String,
    pub sent: bool,
    pub created_at: DateTime<Utc>,
}

/// Fact emitted after a post has been persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCreated {
    pub post_id: u64,
    pub author_id: u64,
    /// Owning user of the author record
    pub user_id: u64,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl PostCreated {
    /// Routing key used on the event stream
    pub const ROUTING_KEY: &'static str = "blog.created";

    pub fn new(post: &BlogPost, author: &Author) -> Self {
        Self {
            post_id: post.id,
            author_id: author.id,
            user_id: author.user_id,
            title: post.title.clone(),
            created_at: post.created_at,
        }
    }
}

// ============================================================================
// Store Contracts
// ============================================================================

/// Persistent user records, keyed by id and unique email
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a user with role `USER`. Duplicate email is a `Conflict`.
    async fn create_user(&self, user: NewUser) -> Result<User>;

    async fn find_by_id(&self, id: u64) -> Result<Option<User>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Compare-and-set the role. Returns `false` if the current role is not `expected`.
    async fn update_role(&self, id: u64, expected: Role, role: Role) -> Result<bool>;

    /// Connectivity probe used by readiness checks
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Author records
#[async_trait]
pub trait AuthorStore: Send + Sync {
    /// Atomically move the user from `USER` to `AUTHOR` and create the author record.
    ///
    /// Fails with `NotFound` for an unknown user and `Conflict` when the user is
    /// already an author. Either both writes land or neither does.
    async fn promote(&self, user_id: u64) -> Result<Author>;

    async fn find_by_user_id(&self, user_id: u64) -> Result<Option<Author>>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create_post(&self, post: NewPost) -> Result<BlogPost>;

    async fn find_post(&self, id: u64) -> Result<Option<BlogPost>>;

    /// Newest first
    async fn list_posts(&self, limit: usize, offset: usize) -> Result<Vec<BlogPost>>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create_notification(&self, user_id: u64, message: &str) -> Result<Notification>;

    async fn list_for_user(&self, user_id: u64) -> Result<Vec<Notification>>;
}

/// Server-side session records (`token -> subject_id`) with store-enforced expiry
///
/// Absence of a record means the token is not an active session, even if its
/// signature still verifies.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Record a session. Last write wins.
    async fn put(&self, token: &str, subject_id: u64, ttl: Duration) -> Result<()>;

    async fn get(&self, token: &str) -> Result<Option<u64>>;

    async fn delete(&self, token: &str) -> Result<()>;

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Fire-and-forget publication of domain events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &PostCreated) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_conversion() {
        assert_eq!(Role::User.as_str(), "USER");
        assert_eq!(Role::Author.as_str(), "AUTHOR");
        assert_eq!("AUTHOR".parse::<Role>().unwrap(), Role::Author);
        assert!("author".parse::<Role>().is_err());
        assert!("ADMIN".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde_uppercase() {
        let json = serde_json::to_string(&Role::Author).unwrap();
        assert_eq!(json, "\"AUTHOR\"");
        let role: Role = serde_json::from_str("\"USER\"").unwrap();
        assert_eq!(role, Role::User);
    }

    #[test]
    fn test_user_hides_password_hash() {
        let user = User {
            id: 7,
            email: "a@b.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            role: Role::User,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("argon2id"));
    }

    #[test]
    fn test_post_created_from_post() {
        let now = Utc::now();
        let author = Author {
            id: 3,
            user_id: 11,
            created_at: now,
        };
        let post = BlogPost {
            id: 42,
            author_id: 3,
            title: "Hello".to_string(),
            content: "World".to_string(),
            created_at: now,
            updated_at: now,
        };

        let event = PostCreated::new(&post, &author);
        assert_eq!(event.post_id, 42);
        assert_eq!(event.author_id, 3);
        assert_eq!(event.user_id, 11);
        assert_eq!(event.title, "Hello");
    }
}
