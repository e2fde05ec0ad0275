//! Archive loading and the serve-until-loaded lifecycle.

pub mod browser;
pub mod lifecycle;

use mv_core::ViewerError;
use mv_core::ViewerResult;
use mv_mime::parse_archive;
use mv_store::ResourceCatalog;
use mv_store::ResourceStore;
use std::fs;
use std::path::Path;
use tracing::info;

pub use browser::BrowserLauncher;
pub use browser::SystemBrowser;
pub use lifecycle::DEFAULT_TIMEOUT;
pub use lifecycle::Viewer;
pub use lifecycle::ViewerConfig;
pub use mv_server::ShutdownReason;

/// Reads an archive from disk and prepares it for serving.
pub fn load_archive(path: &Path) -> ViewerResult<ResourceCatalog> {
    let bytes = fs::read(path).map_err(|error| {
        ViewerError::new(
            "viewer.read_failed",
            format!("failed to read {}: {error}", path.display()),
        )
    })?;
    info!(path = %path.display(), bytes = bytes.len(), "loaded archive");
    prepare(&bytes)
}

/// Parses, normalizes and rewrites an in-memory archive. The returned
/// catalog is ready to be served as is.
pub fn prepare(bytes: &[u8]) -> ViewerResult<ResourceCatalog> {
    let archive = parse_archive(bytes)?;
    let mut store = ResourceStore::from_archive(archive)?;

    for resource in store.resources_mut() {
        mv_charset::normalize(resource)?;
    }

    mv_rewrite::rewrite_store(&mut store)?;
    Ok(store.into_catalog())
}
