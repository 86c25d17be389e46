//! The shared request state handed to all endpoints.
use std::ops::Deref;
use std::sync::Arc;

use anyhow::Result;

use marketpulse_service::config::Config;
use marketpulse_service::services::SharedServices;

/// A cheaply clonable handle to the caches and upstream transport.
#[derive(Debug, Clone)]
pub struct RequestService {
    inner: Arc<SharedServices>,
}

impl RequestService {
    /// Creates the service state from the loaded config.
    pub fn create(config: Config) -> Result<Self> {
        let inner = Arc::new(SharedServices::new(config)?);
        Ok(Self { inner })
    }
}

impl Deref for RequestService {
    type Target = SharedServices;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
