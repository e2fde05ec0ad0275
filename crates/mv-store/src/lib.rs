//! In-memory resource graph keyed by original location.
//!
//! The store is built once from a parsed archive, mutated in place by the
//! charset and rewrite passes, and then frozen into a [`ResourceCatalog`]
//! that only supports lookups.

use encoding_rs::Encoding;
use mv_core::ViewerError;
use mv_core::ViewerResult;
use mv_mime::Archive;
use mv_mime::media_essence;
use std::collections::HashMap;
use tracing::debug;
use tracing::info;
use tracing::warn;
use url::Url;

/// Decoded archive part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Original Content-Location; the lookup key and, escaped, the server path.
    location: String,
    pub content_type: String,
    /// Parsed `location`, the default base for relative references.
    pub base_url: Url,
    pub content_id: Option<String>,
    pub data: Vec<u8>,
    pub is_initial_document: bool,
    /// Set when the bytes were re-encoded to UTF-8.
    pub was_converted: bool,
    /// Encoding the HTML bytes are currently in, once known.
    pub text_encoding: Option<&'static Encoding>,
}

impl Resource {
    pub fn new(
        location: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> ViewerResult<Self> {
        let location = location.into();
        let base_url = Url::parse(&location).map_err(|error| {
            ViewerError::new(
                "store.location_invalid",
                format!("Content-Location `{location}` is not an absolute URL: {error}"),
            )
        })?;

        Ok(Self {
            location,
            content_type: content_type.into(),
            base_url,
            content_id: None,
            data,
            is_initial_document: false,
            was_converted: false,
            text_encoding: None,
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Lowercased `type/subtype` without parameters.
    pub fn media_type(&self) -> String {
        media_essence(&self.content_type)
    }

    pub fn is_html(&self) -> bool {
        self.media_type() == "text/html"
    }

    pub fn is_css(&self) -> bool {
        self.media_type() == "text/css"
    }
}

/// Content-ID (without angle brackets) to owning location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentIdIndex {
    entries: HashMap<String, String>,
}

impl ContentIdIndex {
    pub fn location_for(&self, content_id: &str) -> Option<&str> {
        self.entries.get(content_id).map(String::as_str)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn register(&mut self, content_id: &str, location: &str) {
        if self.entries.contains_key(content_id) {
            warn!(content_id, location, "duplicate Content-ID ignored");
            return;
        }
        self.entries.insert(content_id.to_owned(), location.to_owned());
    }
}

/// Mutable store used during the setup phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceStore {
    resources: Vec<Resource>,
    by_location: HashMap<String, usize>,
    content_ids: ContentIdIndex,
    initial: usize,
}

impl ResourceStore {
    /// Builds the store from every archive part.
    ///
    /// A part without Content-Location but with a Content-ID is keyed
    /// `cid:<id>`; a part with neither is rejected. Duplicate locations keep
    /// the first part.
    pub fn from_archive(archive: Archive) -> ViewerResult<Self> {
        let mut resources: Vec<Resource> = Vec::with_capacity(archive.parts.len());
        let mut by_location = HashMap::new();
        let mut content_ids = ContentIdIndex::default();

        for part in archive.parts {
            let content_id = part.content_id().map(str::to_owned);
            let location = match (part.content_location(), content_id.as_deref()) {
                (Some(location), _) => location.to_owned(),
                (None, Some(content_id)) => format!("cid:{content_id}"),
                (None, None) => {
                    return Err(ViewerError::new(
                        "store.location_missing",
                        format!(
                            "part {} has neither Content-Location nor Content-ID",
                            part.index
                        ),
                    ));
                }
            };

            if by_location.contains_key(&location) {
                warn!(part = part.index, location = %location, "duplicate Content-Location ignored");
                continue;
            }

            let content_type = part.content_type().to_owned();
            let mut resource = Resource::new(location.clone(), content_type, part.body)?;
            if let Some(content_id) = content_id {
                content_ids.register(&content_id, &location);
                resource.content_id = Some(content_id);
            }

            debug!(location = %location, content_type = %resource.content_type, "stored resource");
            by_location.insert(location, resources.len());
            resources.push(resource);
        }

        let initial = resources
            .iter()
            .position(Resource::is_html)
            .ok_or_else(|| ViewerError::new("store.no_html", "no HTML pages to display"))?;
        resources[initial].is_initial_document = true;

        info!(
            resources = resources.len(),
            content_ids = content_ids.len(),
            initial = resources[initial].location(),
            "resource store ready"
        );

        Ok(Self {
            resources,
            by_location,
            content_ids,
            initial,
        })
    }

    pub fn get(&self, location: &str) -> Option<&Resource> {
        self.by_location
            .get(location)
            .and_then(|idx| self.resources.get(*idx))
    }

    pub fn initial_document(&self) -> &Resource {
        &self.resources[self.initial]
    }

    pub fn content_ids(&self) -> &ContentIdIndex {
        &self.content_ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    pub fn resources_mut(&mut self) -> &mut [Resource] {
        &mut self.resources
    }

    /// Mutable resources alongside the read-only Content-ID index, for
    /// passes that rewrite one resource while resolving `cid:` references.
    pub fn split_for_rewrite(&mut self) -> (&mut [Resource], &ContentIdIndex) {
        (&mut self.resources, &self.content_ids)
    }

    /// Freezes the store for serving.
    pub fn into_catalog(self) -> ResourceCatalog {
        let mut by_folded_location = HashMap::with_capacity(self.resources.len());
        for (idx, resource) in self.resources.iter().enumerate() {
            by_folded_location
                .entry(resource.location().to_lowercase())
                .or_insert(idx);
        }

        ResourceCatalog {
            resources: self.resources,
            by_location: self.by_location,
            by_folded_location,
            initial: self.initial,
        }
    }
}

/// Read-only view of the final resources, shared with the content server.
#[derive(Debug)]
pub struct ResourceCatalog {
    resources: Vec<Resource>,
    by_location: HashMap<String, usize>,
    by_folded_location: HashMap<String, usize>,
    initial: usize,
}

impl ResourceCatalog {
    /// Exact location match, falling back to a case-insensitive match.
    pub fn lookup(&self, location: &str) -> Option<&Resource> {
        self.by_location
            .get(location)
            .or_else(|| self.by_folded_location.get(&location.to_lowercase()))
            .and_then(|idx| self.resources.get(*idx))
    }

    pub fn initial_document(&self) -> &Resource {
        &self.resources[self.initial]
    }
}
