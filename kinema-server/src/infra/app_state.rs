use std::fmt;
use std::sync::Arc;

use kinema_core::service::IngestService;

use crate::infra::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<IngestService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(service: Arc<IngestService>, config: Arc<Config>) -> Self {
        Self { service, config }
    }

    pub fn service(&self) -> &IngestService {
        &self.service
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
