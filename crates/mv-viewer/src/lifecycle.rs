//! Serve, open, wait, shut down.

use crate::browser::BrowserLauncher;
use mv_core::ViewerResult;
use mv_server::ContentServer;
use mv_server::ShutdownReason;
use mv_server::shutdown_channel;
use mv_store::ResourceCatalog;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing::warn;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewerConfig {
    /// How long to wait for the done signal after the browser was opened.
    pub timeout: Duration,
    /// When false, the URL is printed instead and no deadline applies.
    pub open_browser: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            open_browser: true,
        }
    }
}

/// Lifecycle controller for one archive.
#[derive(Debug)]
pub struct Viewer<L> {
    config: ViewerConfig,
    launcher: L,
}

impl<L: BrowserLauncher> Viewer<L> {
    pub fn new(config: ViewerConfig, launcher: L) -> Self {
        Self { config, launcher }
    }

    /// Serves `catalog` until the initial document reports that it loaded,
    /// or the timeout elapses after a successful browser launch. Without a
    /// browser there is no deadline.
    pub fn run(&self, catalog: ResourceCatalog) -> ViewerResult<ShutdownReason> {
        let catalog = Arc::new(catalog);
        let (trigger, signal) = shutdown_channel();
        let server = ContentServer::bind(Arc::clone(&catalog), trigger)?;
        let url = server.local_url(catalog.initial_document().location());

        let opened = self.config.open_browser && self.launch(&url);
        let reason = if opened {
            signal.wait_timeout(self.config.timeout)
        } else {
            println!("Open the following URL manually:");
            println!("{url}");
            signal.wait()
        };

        server.close();
        let reason = reason?;
        info!(reason = reason.as_str(), "viewer finished");
        Ok(reason)
    }

    fn launch(&self, url: &str) -> bool {
        match self.launcher.open(url) {
            Ok(()) => {
                info!(%url, timeout = ?self.config.timeout, "opened browser");
                true
            }
            Err(error) => {
                warn!(%error, "couldn't start browser");
                false
            }
        }
    }
}
