//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::broadcast::Broadcaster;
use crate::links::LinkRegistry;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Broadcast engine; also registered as the store's save listener
    pub broadcaster: Arc<Broadcaster>,

    /// Link registry, PostgreSQL-backed when a database is configured
    pub links: LinkRegistry,
}

impl AppState {
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            links: broadcaster.links().clone(),
            broadcaster,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
