mod batch;
mod bulkops;
mod conflict;
mod error;

pub use batch::process_batch;
pub use conflict::{detect, detect_siblings, validate_range};
pub use error::EngineError;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use ulid::Ulid;

use crate::audit::AuditHub;
use crate::cache::TemplateCache;
use crate::model::*;
use crate::monitor::PerformanceMonitor;

/// The CRUD/persistence collaborator that actually writes shifts. Errors are
/// opaque here — the engine retries blindly up to the configured attempts.
#[async_trait]
pub trait MutationExecutor: Send + Sync {
    async fn execute(&self, mutation: &ShiftMutation) -> Result<PersistedShift, ItemError>;
}

/// Read side of the persistence collaborator: persisted shifts for one
/// employee on one day, used for conflict pre-checks.
#[async_trait]
pub trait ShiftLookup: Send + Sync {
    async fn existing_shifts(&self, employee_id: Ulid, date: NaiveDate) -> Vec<ExistingShift>;
}

/// Template source of record; consulted on cache misses.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn fetch(&self, tenant_id: &str, query: &TemplateQuery) -> Vec<ShiftTemplate>;
}

/// The bulk scheduling operations engine. Owns the process-wide template
/// cache, performance monitor, and audit hub; everything else is reached
/// through the injected collaborator traits.
pub struct Engine {
    executor: Arc<dyn MutationExecutor>,
    lookup: Arc<dyn ShiftLookup>,
    template_store: Arc<dyn TemplateStore>,
    pub template_cache: TemplateCache,
    pub monitor: PerformanceMonitor,
    pub audit: Arc<AuditHub>,
}

impl Engine {
    pub fn new(
        executor: Arc<dyn MutationExecutor>,
        lookup: Arc<dyn ShiftLookup>,
        template_store: Arc<dyn TemplateStore>,
    ) -> Self {
        Self {
            executor,
            lookup,
            template_store,
            template_cache: TemplateCache::default(),
            monitor: PerformanceMonitor::new(),
            audit: Arc::new(AuditHub::new()),
        }
    }

    /// Resolve the templates for this tenant + query shape, read-through:
    /// cache hit wins, a miss falls back to the store and populates the
    /// cache.
    async fn resolve_templates(
        &self,
        tenant_id: &str,
        query: &TemplateQuery,
    ) -> Vec<ShiftTemplate> {
        if let Some(templates) = self.template_cache.get(tenant_id, query) {
            return templates;
        }
        let fetched = self.template_store.fetch(tenant_id, query).await;
        self.template_cache.set(tenant_id, query, fetched.clone());
        fetched
    }
}
