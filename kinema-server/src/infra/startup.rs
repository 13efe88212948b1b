use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use kinema_core::database::seed::{seed_builtin, seed_from_file};
use kinema_core::database::{InMemoryStore, Repositories};
use kinema_core::providers::TmdbProvider;
use kinema_core::service::IngestService;
use kinema_core::types::FolderRoles;
use tracing::{info, warn};

use crate::infra::config::Config;

/// Build the ingest service on a fresh in-memory store, seeded per the
/// catalog settings. The service is not started.
pub async fn build_service(config: &Config) -> Result<Arc<IngestService>> {
    let store = Arc::new(InMemoryStore::new());

    if config.catalog.seed_builtin {
        let seeded = seed_builtin(store.as_ref())
            .await
            .context("failed to seed built-in catalog")?;
        info!(entries = seeded, "built-in catalog seeded");
    }
    if let Some(path) = &config.catalog.seed_file {
        seed_from_file(store.as_ref(), path)
            .await
            .with_context(|| format!("failed to load catalog file {}", path.display()))?;
    }

    let provider = TmdbProvider::new(&config.ingest.provider)
        .context("failed to build TMDB client")?;

    let service = IngestService::builder()
        .with_config(config.ingest.clone())
        .with_repositories(Repositories::in_memory(store))
        .with_provider(Arc::new(provider))
        .build()
        .context("failed to assemble ingest service")?;

    Ok(Arc::new(service))
}

/// Register folders named on the command line or in configuration. A folder
/// that cannot be added is logged and skipped.
pub async fn register_folders(service: &IngestService, folders: &[PathBuf]) -> usize {
    let mut registered = 0;
    for folder in folders {
        match service.add_folder(folder, FolderRoles::default()).await {
            Ok(added) => {
                registered += 1;
                info!(
                    folder = %added.folder.path.display(),
                    created = added.created,
                    "folder registered at startup"
                );
            }
            Err(err) => {
                warn!(folder = %folder.display(), error = %err, "could not register folder");
            }
        }
    }
    registered
}
