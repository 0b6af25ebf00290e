//! Application state management
//!
//! Author: hephaex@gmail.com

use crate::auth::{AuthService, PromotionService, TokenService};
use crate::notifications::NotificationService;
use crate::posts::PostService;
use inkwell_core::{
    AppConfig, AuthorStore, CredentialStore, EventPublisher, MemoryEventBus, MemorySessionStore,
    MemoryStore, NotificationStore, PostStore, SessionStore,
};
use inkwell_store::{PgStore, RedisSessionStore, RedisStreamPublisher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Backend handles the services are built from
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn CredentialStore>,
    pub authors: Arc<dyn AuthorStore>,
    pub posts: Arc<dyn PostStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub events: Arc<dyn EventPublisher>,
}

impl Stores {
    /// PostgreSQL records, Redis sessions and Redis stream events
    pub async fn connect(config: &AppConfig) -> inkwell_core::Result<Self> {
        let pg = Arc::new(PgStore::connect(&config.database).await?);
        let sessions = Arc::new(RedisSessionStore::connect(&config.session).await?);
        let events = Arc::new(RedisStreamPublisher::connect(&config.session, &config.events).await?);

        Ok(Self {
            users: pg.clone(),
            authors: pg.clone(),
            posts: pg.clone(),
            notifications: pg,
            sessions,
            events,
        })
    }

    /// All records in one `MemoryStore`
    pub fn memory(
        store: Arc<MemoryStore>,
        sessions: Arc<dyn SessionStore>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            users: store.clone(),
            authors: store.clone(),
            posts: store.clone(),
            notifications: store,
            sessions,
            events,
        }
    }

    /// Fresh in-memory backends, returning the event bus for the worker
    pub fn in_memory() -> (Self, Arc<MemoryEventBus>) {
        let bus = Arc::new(MemoryEventBus::default());
        let stores = Self::memory(
            Arc::new(MemoryStore::new()),
            Arc::new(MemorySessionStore::new()),
            bus.clone(),
        );
        (stores, bus)
    }
}

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Accepting traffic; false until the listener is bound and again once shutdown starts
    pub is_ready: AtomicBool,
    pub tokens: Arc<TokenService>,
    pub stores: Stores,
    pub sessions: Arc<dyn SessionStore>,
    pub auth: AuthService,
    pub promotion: PromotionService,
    pub posts: PostService,
    pub notifications: NotificationService,
}

impl AppState {
    pub fn new(config: AppConfig, stores: Stores) -> Self {
        let tokens = Arc::new(TokenService::from_config(&config.jwt));

        Self {
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            is_ready: AtomicBool::new(false),
            auth: AuthService::new(stores.users.clone(), stores.sessions.clone(), tokens.clone()),
            promotion: PromotionService::new(stores.users.clone(), stores.authors.clone()),
            posts: PostService::new(
                stores.authors.clone(),
                stores.posts.clone(),
                stores.events.clone(),
            ),
            notifications: NotificationService::new(stores.notifications.clone()),
            sessions: stores.sessions.clone(),
            tokens,
            stores,
            config,
        }
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }
}
