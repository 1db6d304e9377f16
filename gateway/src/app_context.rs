use std::path::Path;
use std::sync::Arc;

use common_redis::Client;
use health::HealthRegistry;

use crate::curated::{CuratedQuery, CuratedStore};
use crate::dedupe::DedupeFilters;
use crate::policy::PolicyStore;
use crate::rejections::RejectionStore;
use crate::sinks::CatalogSink;
use crate::time::TimeSource;

/// The explicit dependencies every stage of the pipeline hangs off: the
/// KV client, the durable-log sink, the dedup filters, the file-backed
/// stores and the clock. Built once at startup, shared as an Arc by the
/// HTTP handlers and both consumer loops.
pub struct AppContext {
    pub sink: Arc<dyn CatalogSink + Send + Sync>,
    pub redis: Arc<dyn Client + Send + Sync>,
    pub filters: DedupeFilters,
    pub curated: CuratedStore,
    pub catalog: CuratedQuery,
    pub rejections: RejectionStore,
    pub policy: PolicyStore,
    pub timesource: Arc<dyn TimeSource + Send + Sync>,
    pub liveness: HealthRegistry,
}

impl AppContext {
    pub fn new(
        sink: Arc<dyn CatalogSink + Send + Sync>,
        redis: Arc<dyn Client + Send + Sync>,
        timesource: Arc<dyn TimeSource + Send + Sync>,
        data_dir: &Path,
        liveness: HealthRegistry,
    ) -> Self {
        Self {
            sink,
            filters: DedupeFilters::new(redis.clone()),
            curated: CuratedStore::new(data_dir),
            catalog: CuratedQuery::new(data_dir),
            rejections: RejectionStore::new(data_dir),
            policy: PolicyStore::new(redis.clone()),
            redis,
            timesource,
            liveness,
        }
    }
}
