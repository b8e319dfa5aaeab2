use std::sync::Arc;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::services::engine::AttemptEngine;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    engine: AttemptEngine,
    redis: RedisHandle,
}

impl AppState {
    pub(crate) fn new(settings: Settings, engine: AttemptEngine, redis: RedisHandle) -> Self {
        Self { inner: Arc::new(InnerState { settings, engine, redis }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn engine(&self) -> &AttemptEngine {
        &self.inner.engine
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }
}
