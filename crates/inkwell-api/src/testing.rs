//! In-memory application wiring for integration tests

use crate::create_router;
use crate::state::{AppState, Stores};
use axum::Router;
use inkwell_core::{AppConfig, MemoryEventBus, MemorySessionStore, MemoryStore, SessionStore};
use std::sync::Arc;

/// Secret used by test routers
pub const TEST_SECRET: &str = "integration-test-secret";

/// Router plus handles on its backends
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub events: Arc<MemoryEventBus>,
}

impl TestApp {
    /// A fresh router sharing the same state
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Config the test routers start from
pub fn test_config() -> AppConfig {
    let mut config = AppConfig {
        environment: "test".to_string(),
        ..Default::default()
    };
    config.jwt.secret = TEST_SECRET.to_string();
    config
}

/// Router over in-memory records, sessions and event bus
pub fn create_router_for_testing() -> TestApp {
    create_router_with_sessions(Arc::new(MemorySessionStore::new()))
}

/// Same, with a caller-supplied session store
pub fn create_router_with_sessions(sessions: Arc<dyn SessionStore>) -> TestApp {
    create_router_with_config(test_config(), sessions)
}

/// Ready router built from an explicit config
pub fn create_router_with_config(config: AppConfig, sessions: Arc<dyn SessionStore>) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let events = Arc::new(MemoryEventBus::default());
    let stores = Stores::memory(store.clone(), sessions, events.clone());
    let state = Arc::new(AppState::new(config, stores));
    state.set_ready(true);

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        events,
    }
}
