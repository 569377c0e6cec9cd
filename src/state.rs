//! Application state management
//!
//! Contains shared state accessible across all handlers. The registry is
//! built once at startup and only read afterwards, so no locking is needed.

use crate::schema::{reflect, MetadataDocument, Registry};
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Entity registry of the running application
    pub registry: Registry,

    /// Namespace documented by the models endpoint
    pub app_label: String,
}

impl AppState {
    pub fn new(registry: Registry, app_label: impl Into<String>) -> Self {
        Self {
            registry,
            app_label: app_label.into(),
        }
    }

    /// Reflect the configured namespace of the registry
    pub fn document(&self) -> MetadataDocument {
        reflect(&self.registry, &self.app_label)
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
