//! Request path to resource mapping.

use mv_store::Resource;
use mv_store::ResourceCatalog;
use percent_encoding::percent_decode_str;

/// Path the injected load script requests.
pub const DONE_SIGNAL_PATH: &str = "/done-signal";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route<'a> {
    DoneSignal,
    Resource(&'a Resource),
    /// Carries the decoded lookup key.
    NotFound(String),
}

/// Maps a request target (path plus optional query) to a route.
pub fn route<'a>(catalog: &'a ResourceCatalog, target: &str) -> Route<'a> {
    if target == DONE_SIGNAL_PATH {
        return Route::DoneSignal;
    }

    let key = lookup_key(target);
    match catalog.lookup(&key) {
        Some(resource) => Route::Resource(resource),
        None => Route::NotFound(key),
    }
}

/// Strips the leading `/` and any query, then percent-decodes.
pub fn lookup_key(target: &str) -> String {
    let path = target.split_once('?').map_or(target, |(path, _)| path);
    let path = path.strip_prefix('/').unwrap_or(path);
    percent_decode_str(path).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::Route;
    use super::lookup_key;
    use super::route;
    use mv_mime::parse_archive;
    use mv_store::ResourceCatalog;
    use mv_store::ResourceStore;

    fn catalog() -> ResourceCatalog {
        let raw = "Content-Type: multipart/related; boundary=b\r\n\r\n\
--b\r\nContent-Type: text/html\r\nContent-Location: http://example.com/\r\n\r\n<p>x</p>\r\n\
--b\r\nContent-Type: image/png\r\nContent-Location: http://example.com/img/Logo.png\r\n\r\npng\r\n\
--b--\r\n";
        let archive = match parse_archive(raw.as_bytes()) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        match ResourceStore::from_archive(archive) {
            Ok(value) => value.into_catalog(),
            Err(error) => panic!("{error}"),
        }
    }

    fn routed_location(catalog: &ResourceCatalog, target: &str) -> Option<String> {
        match route(catalog, target) {
            Route::Resource(resource) => Some(resource.location().to_owned()),
            _ => None,
        }
    }

    #[test]
    fn done_signal_matches_exactly() {
        let catalog = catalog();
        assert_eq!(route(&catalog, "/done-signal"), Route::DoneSignal);
        assert!(matches!(route(&catalog, "/done-signal?x=1"), Route::NotFound(_)));
    }

    #[test]
    fn escaped_paths_find_resources() {
        let catalog = catalog();
        assert_eq!(
            routed_location(&catalog, "/http%3A%2F%2Fexample.com%2Fimg%2FLogo.png"),
            Some("http://example.com/img/Logo.png".to_owned())
        );
        assert_eq!(
            routed_location(&catalog, "/http%3A%2F%2Fexample.com%2Fimg%2Flogo.PNG?cache=1"),
            Some("http://example.com/img/Logo.png".to_owned())
        );
    }

    #[test]
    fn misses_report_the_decoded_key() {
        let catalog = catalog();
        assert_eq!(
            route(&catalog, "/http%3A%2F%2Fexample.com%2Fnope"),
            Route::NotFound("http://example.com/nope".to_owned())
        );
        assert_eq!(lookup_key("/"), "");
    }
}
