//! The relational catalog database is an external collaborator: this crate
//! only defines the one operation the janitor needs, as a single trait
//! method rather than a full DAO, and injects it as a dependency instead
//! of reaching for a hidden process-wide singleton.

use async_trait::async_trait;
use thiserror::Error;

/// Errors a [`CatalogStore`] implementation may surface.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog database error: {0}")]
    Query(String),
}

/// The relational catalog's event-log row GC surface.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Delete expired service-event-log rows. Row-selection policy lives
    /// entirely in the implementation.
    async fn delete_service_event_log(&self) -> Result<(), CatalogError>;
}

/// No-op [`CatalogStore`], used when no catalog database is configured
/// (tests, or a deployment that only cares about log-file GC).
#[derive(Debug, Default)]
pub struct NoopCatalogStore;

#[async_trait]
impl CatalogStore for NoopCatalogStore {
    async fn delete_service_event_log(&self) -> Result<(), CatalogError> {
        Ok(())
    }
}
