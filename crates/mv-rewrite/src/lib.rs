//! Reference rewriting pipeline: turns every resource-loading reference in
//! the stored HTML and CSS into a path served by the local content server.

pub mod html;
pub mod reference;

use mv_core::ViewerResult;
use mv_css::rewrite_stylesheet;
use mv_store::ContentIdIndex;
use mv_store::Resource;
use mv_store::ResourceStore;
use reference::ReferenceMapper;
use tracing::info;

pub use html::DONE_SIGNAL_SCRIPT;
pub use html::rewrite_html;
pub use reference::local_path;
pub use reference::resolve;

/// Counts reported by [`rewrite_store`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteSummary {
    pub html_documents: usize,
    pub stylesheets: usize,
    pub references: usize,
}

/// Rewrites every HTML and CSS resource of the store in place.
pub fn rewrite_store(store: &mut ResourceStore) -> ViewerResult<RewriteSummary> {
    let (resources, content_ids) = store.split_for_rewrite();
    let mut summary = RewriteSummary::default();

    for resource in resources.iter_mut() {
        if resource.is_html() {
            summary.references += rewrite_html(resource, content_ids)?;
            summary.html_documents += 1;
        } else if resource.is_css() {
            summary.references += rewrite_css(resource, content_ids);
            summary.stylesheets += 1;
        }
    }

    info!(
        html_documents = summary.html_documents,
        stylesheets = summary.stylesheets,
        references = summary.references,
        "rewrote archive references"
    );
    Ok(summary)
}

/// Rewrites `url(...)` references of a stylesheet resource against its own
/// location.
pub fn rewrite_css(resource: &mut Resource, content_ids: &ContentIdIndex) -> usize {
    let mapper = ReferenceMapper::new(&resource.base_url, content_ids);
    let mut rewritten = 0_usize;
    let data = rewrite_stylesheet(&resource.data, |target| {
        let path = mapper.local_path(target);
        if path.is_some() {
            rewritten += 1;
        }
        path
    });
    resource.data = data;
    rewritten
}
