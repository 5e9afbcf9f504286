use std::sync::Arc;

use sqlx::PgPool;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::services::identity::IdentityResolver;
use crate::services::storage::ObjectStorage;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    redis: RedisHandle,
    storage: Option<Arc<dyn ObjectStorage>>,
    identity: Arc<dyn IdentityResolver>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        db: PgPool,
        redis: RedisHandle,
        storage: Option<Arc<dyn ObjectStorage>>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, db, redis, storage, identity }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    /// Archival object storage; `None` when S3 credentials are not configured.
    pub(crate) fn storage(&self) -> Option<&dyn ObjectStorage> {
        self.inner.storage.as_deref()
    }

    pub(crate) fn identity(&self) -> &dyn IdentityResolver {
        self.inner.identity.as_ref()
    }
}
