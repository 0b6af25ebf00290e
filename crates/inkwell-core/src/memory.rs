//! In-memory store implementations
//!
//! Intended for tests and local development (`--in-memory`). All tables live
//! behind a single lock, so multi-step operations such as promotion are atomic.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::{
    Author, AuthorStore, BlogPost, CredentialStore, EventPublisher, InkwellError, NewPost,
    NewUser, Notification, NotificationStore, PostCreated, PostStore, Result, Role,
    SessionStore, User,
};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<u64, User>,
    /// Keyed by user id (unique)
    authors: BTreeMap<u64, Author>,
    posts: BTreeMap<u64, BlogPost>,
    notifications: Vec<Notification>,
    next_user_id: u64,
    next_author_id: u64,
    next_post_id: u64,
    next_notification_id: u64,
}

impl Tables {
    fn next(counter: &mut u64) -> u64 {
        *counter += 1;
        *counter
    }

    fn set_role(&mut self, id: u64, expected: Role, role: Role) -> Result<bool> {
        let user = self
            .users
            .get_mut(&id)
            .ok_or_else(|| InkwellError::NotFound("User".to_string()))?;
        if user.role != expected {
            return Ok(false);
        }
        user.role = role;
        Ok(true)
    }
}

/// Relational store stand-in implementing every record store contract
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of author records held for a user
    pub async fn author_count(&self, user_id: u64) -> usize {
        let tables = self.tables.read().await;
        tables
            .authors
            .values()
            .filter(|a| a.user_id == user_id)
            .count()
    }

    /// Store an author record without touching the user's role.
    ///
    /// Exists to reproduce inconsistent legacy data in tests.
    pub async fn insert_author_record(&self, user_id: u64) -> Author {
        let mut tables = self.tables.write().await;
        let id = Tables::next(&mut tables.next_author_id);
        let author = Author {
            id,
            user_id,
            created_at: Utc::now(),
        };
        tables.authors.insert(user_id, author.clone());
        author
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(InkwellError::Conflict("email already registered".to_string()));
        }

        let id = Tables::next(&mut tables.next_user_id);
        let created = User {
            id,
            email: user.email,
            password_hash: user.password_hash,
            role: Role::User,
            created_at: Utc::now(),
        };
        tables.users.insert(id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn update_role(&self, id: u64, expected: Role, role: Role) -> Result<bool> {
        self.tables.write().await.set_role(id, expected, role)
    }
}

#[async_trait]
impl AuthorStore for MemoryStore {
    async fn promote(&self, user_id: u64) -> Result<Author> {
        let mut tables = self.tables.write().await;

        if tables.authors.contains_key(&user_id) {
            return Err(InkwellError::Conflict("already an author".to_string()));
        }
        if !tables.set_role(user_id, Role::User, Role::Author)? {
            return Err(InkwellError::Conflict("already an author".to_string()));
        }

        let id = Tables::next(&mut tables.next_author_id);
        let author = Author {
            id,
            user_id,
            created_at: Utc::now(),
        };
        tables.authors.insert(user_id, author.clone());
        Ok(author)
    }

    async fn find_by_user_id(&self, user_id: u64) -> Result<Option<Author>> {
        Ok(self.tables.read().await.authors.get(&user_id).cloned())
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn create_post(&self, post: NewPost) -> Result<BlogPost> {
        let mut tables = self.tables.write().await;
        let id = Tables::next(&mut tables.next_post_id);
        let now = Utc::now();
        let created = BlogPost {
            id,
            author_id: post.author_id,
            title: post.title,
            content: post.content,
            created_at: now,
            updated_at: now,
        };
        tables.posts.insert(id, created.clone());
        Ok(created)
    }

    async fn find_post(&self, id: u64) -> Result<Option<BlogPost>> {
        Ok(self.tables.read().await.posts.get(&id).cloned())
    }

    async fn list_posts(&self, limit: usize, offset: usize) -> Result<Vec<BlogPost>> {
        let tables = self.tables.read().await;
        Ok(tables
            .posts
            .values()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create_notification(&self, user_id: u64, message: &str) -> Result<Notification> {
        let mut tables = self.tables.write().await;
        let id = Tables::next(&mut tables.next_notification_id);
        let notification = Notification {
            id,
            user_id,
            message: message.to_string(),
            sent: false,
            created_at: Utc::now(),
        };
        tables.notifications.push(notification.clone());
        Ok(notification)
    }

    async fn list_for_user(&self, user_id: u64) -> Result<Vec<Notification>> {
        let tables = self.tables.read().await;
        Ok(tables
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// Session store with per-record expiry
///
/// Expired records are dropped when read and swept on every write.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, (u64, Instant)>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let sessions = self.sessions.lock().await;
        sessions.values().filter(|(_, exp)| *exp > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, token: &str, subject_id: u64, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, (_, expires)| *expires > now);
        sessions.insert(token.to_string(), (subject_id, now + ttl));
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<u64>> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(token).copied() {
            Some((subject_id, expires)) if expires > Instant::now() => Ok(Some(subject_id)),
            Some(_) => {
                sessions.remove(token);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, token: &str) -> Result<()> {
        self.sessions.lock().await.remove(token);
        Ok(())
    }
}

/// In-process event bus
///
/// Every published event is fanned out to subscribers, and the last
/// `capacity` are kept for inspection. Sending with no subscribers is not an
/// error.
#[derive(Debug)]
pub struct MemoryEventBus {
    sender: broadcast::Sender<PostCreated>,
    published: Mutex<VecDeque<PostCreated>>,
    capacity: usize,
}

impl MemoryEventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PostCreated> {
        self.sender.subscribe()
    }

    /// Most recent events, oldest first
    pub async fn published(&self) -> Vec<PostCreated> {
        self.published.lock().await.iter().cloned().collect()
    }
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventPublisher for MemoryEventBus {
    async fn publish(&self, event: &PostCreated) -> Result<()> {
        {
            let mut published = self.published.lock().await;
            if published.len() == self.capacity {
                published.pop_front();
            }
            published.push_back(event.clone());
        }
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@b.com")).await.unwrap();

        assert_eq!(user.role, Role::User);
        assert_eq!(
            store.find_by_id(user.id).await.unwrap().unwrap().email,
            "a@b.com"
        );
        assert_eq!(
            store.find_by_email("a@b.com").await.unwrap().unwrap().id,
            user.id
        );
        assert!(store.find_by_email("x@y.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryStore::new();
        store.create_user(new_user("a@b.com")).await.unwrap();
        let err = store.create_user(new_user("a@b.com")).await.unwrap_err();
        assert!(matches!(err, InkwellError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_role_is_compare_and_set() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@b.com")).await.unwrap();

        assert!(store
            .update_role(user.id, Role::User, Role::Author)
            .await
            .unwrap());
        assert!(!store
            .update_role(user.id, Role::User, Role::Author)
            .await
            .unwrap());
        assert!(matches!(
            store.update_role(999, Role::User, Role::Author).await,
            Err(InkwellError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_promote_once() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@b.com")).await.unwrap();

        let author = store.promote(user.id).await.unwrap();
        assert_eq!(author.user_id, user.id);
        assert_eq!(
            store.find_by_id(user.id).await.unwrap().unwrap().role,
            Role::Author
        );

        let err = store.promote(user.id).await.unwrap_err();
        assert!(matches!(err, InkwellError::Conflict(_)));
        assert_eq!(store.author_count(user.id).await, 1);
    }

    #[tokio::test]
    async fn test_promote_unknown_user() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.promote(42).await,
            Err(InkwellError::NotFound(_))
        ));
        assert_eq!(store.author_count(42).await, 0);
    }

    #[tokio::test]
    async fn test_promote_with_existing_author_record_leaves_role() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@b.com")).await.unwrap();
        store.insert_author_record(user.id).await;

        assert!(store.promote(user.id).await.is_err());
        assert_eq!(
            store.find_by_id(user.id).await.unwrap().unwrap().role,
            Role::User
        );
        assert_eq!(store.author_count(user.id).await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_promotions_single_winner() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let user = store.create_user(new_user("a@b.com")).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.promote(user.id).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(store.author_count(user.id).await, 1);
    }

    #[tokio::test]
    async fn test_list_posts_newest_first() {
        let store = MemoryStore::new();
        for title in ["first", "second", "third"] {
            store
                .create_post(NewPost {
                    author_id: 1,
                    title: title.to_string(),
                    content: String::new(),
                })
                .await
                .unwrap();
        }

        let posts = store.list_posts(2, 0).await.unwrap();
        let titles: Vec<_> = posts.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["third", "second"]);

        let rest = store.list_posts(10, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].title, "first");

        assert!(store.list_posts(10, usize::MAX).await.unwrap().is_empty());
        assert_eq!(store.list_posts(usize::MAX, 0).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_notifications_scoped_to_user() {
        let store = MemoryStore::new();
        store.create_notification(1, "hello").await.unwrap();
        store.create_notification(2, "other").await.unwrap();

        let mine = store.list_for_user(1).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].message, "hello");
        assert!(!mine[0].sent);
    }

    #[tokio::test]
    async fn test_session_put_get_delete() {
        let sessions = MemorySessionStore::new();
        sessions
            .put("tok", 7, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(sessions.get("tok").await.unwrap(), Some(7));

        // last write wins
        sessions
            .put("tok", 8, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(sessions.get("tok").await.unwrap(), Some(8));

        sessions.delete("tok").await.unwrap();
        assert_eq!(sessions.get("tok").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_session_expires() {
        let sessions = MemorySessionStore::new();
        sessions.put("tok", 7, Duration::ZERO).await.unwrap();
        assert_eq!(sessions.get("tok").await.unwrap(), None);
        assert!(sessions.is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_sessions_swept_on_write() {
        let sessions = MemorySessionStore::new();
        for token in ["a", "b", "c"] {
            sessions.put(token, 7, Duration::ZERO).await.unwrap();
        }

        sessions
            .put("live", 7, Duration::from_secs(60))
            .await
            .unwrap();

        let held: Vec<_> = sessions.sessions.lock().await.keys().cloned().collect();
        assert_eq!(held, vec!["live".to_string()]);
    }

    #[tokio::test]
    async fn test_event_bus_records_and_fans_out() {
        let bus = MemoryEventBus::default();
        let mut rx = bus.subscribe();
        let event = PostCreated {
            post_id: 1,
            author_id: 2,
            user_id: 3,
            title: "t".to_string(),
            created_at: Utc::now(),
        };

        bus.publish(&event).await.unwrap();

        assert_eq!(bus.published().await, vec![event.clone()]);
        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_bus_keeps_only_recent() {
        let bus = MemoryEventBus::new(2);
        for post_id in 1..=3 {
            bus.publish(&PostCreated {
                post_id,
                author_id: 2,
                user_id: 3,
                title: "t".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        }

        let ids: Vec<_> = bus.published().await.iter().map(|e| e.post_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }
}
