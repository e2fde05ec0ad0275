use mv_core::ViewerError;
use mv_core::ViewerResult;
use mv_viewer::BrowserLauncher;
use mv_viewer::ShutdownReason;
use mv_viewer::Viewer;
use mv_viewer::ViewerConfig;
use mv_viewer::prepare;
use std::io::Read;
use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

const IMAGE_PATH: &str = "/http%3A%2F%2Fexample.com%2Fimg%2Flogo.png";

#[derive(Debug)]
struct Fetched {
    status: u16,
    head: String,
    body: Vec<u8>,
}

/// Plays the browser: fetches the page, then every extra path, then reports
/// that loading finished.
#[derive(Clone, Default)]
struct ScriptedBrowser {
    extra_paths: Vec<&'static str>,
    send_done_signal: bool,
    fail_launch: bool,
    log: Arc<Mutex<Vec<(String, Fetched)>>>,
}

impl ScriptedBrowser {
    fn fetched(&self, path: &str) -> Fetched {
        let mut log = match self.log.lock() {
            Ok(log) => log,
            Err(error) => panic!("{error}"),
        };
        match log.iter().position(|(fetched, _)| fetched == path) {
            Some(index) => log.remove(index).1,
            None => panic!("{path} was never fetched"),
        }
    }

    fn page(&self) -> Fetched {
        let mut log = match self.log.lock() {
            Ok(log) => log,
            Err(error) => panic!("{error}"),
        };
        log.remove(0).1
    }
}

impl BrowserLauncher for ScriptedBrowser {
    fn open(&self, url: &str) -> ViewerResult<()> {
        let rest = url.strip_prefix("http://").unwrap_or(url);
        let (authority, page) = rest.split_at(rest.find('/').unwrap_or(rest.len()));
        let authority = authority.to_owned();

        let mut paths = vec![page.to_owned()];
        paths.extend(self.extra_paths.iter().map(|path| (*path).to_owned()));

        if self.fail_launch {
            // The user opens the printed URL some time later.
            let this = self.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                this.visit(&authority, &paths);
            });
            return Err(ViewerError::new("browser.spawn_failed", "no browser here"));
        }

        self.visit(&authority, &paths);
        Ok(())
    }
}

impl ScriptedBrowser {
    fn visit(&self, authority: &str, paths: &[String]) {
        for path in paths {
            let fetched = get(authority, path);
            if let Ok(mut log) = self.log.lock() {
                log.push((path.clone(), fetched));
            }
        }
        if self.send_done_signal {
            let fetched = get(authority, "/done-signal");
            assert_eq!(fetched.status, 204);
        }
    }
}

fn get(authority: &str, path: &str) -> Fetched {
    let mut stream = match TcpStream::connect(authority) {
        Ok(stream) => stream,
        Err(error) => panic!("{error}"),
    };
    let request = format!("GET {path} HTTP/1.1\r\nHost: {authority}\r\nConnection: close\r\n\r\n");
    if let Err(error) = stream.write_all(request.as_bytes()) {
        panic!("{error}");
    }
    let mut raw = Vec::new();
    if let Err(error) = stream.read_to_end(&mut raw) {
        panic!("{error}");
    }

    let split = match raw.windows(4).position(|window| window == b"\r\n\r\n") {
        Some(index) => index,
        None => panic!("response without a header terminator"),
    };
    let head = String::from_utf8_lossy(&raw[..split]).into_owned();
    let body = raw[split + 4..].to_vec();
    let status = head
        .split(' ')
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);
    Fetched { status, head, body }
}

fn run(raw: &[u8], browser: &ScriptedBrowser, config: ViewerConfig) -> ShutdownReason {
    let catalog = match prepare(raw) {
        Ok(catalog) => catalog,
        Err(error) => panic!("{error}"),
    };
    match Viewer::new(config, browser.clone()).run(catalog) {
        Ok(reason) => reason,
        Err(error) => panic!("{error}"),
    }
}

fn quick_config() -> ViewerConfig {
    ViewerConfig {
        timeout: Duration::from_secs(10),
        open_browser: true,
    }
}

const PAGE_WITH_IMAGE: &str = "From: <Saved by a browser>\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/related; type=\"text/html\"; boundary=\"----=_Part\"\r\n\r\n\
------=_Part\r\n\
Content-Type: text/html\r\n\
Content-Location: http://example.com/index.html\r\n\r\n\
<html><head><title>t</title></head><body><img src=\"img/logo.png\"></body></html>\r\n\
------=_Part\r\n\
Content-Type: image/png\r\n\
Content-Transfer-Encoding: base64\r\n\
Content-Location: http://example.com/img/logo.png\r\n\r\n\
iVBORw0K\r\n\
------=_Part--\r\n";

#[test]
fn page_and_image_are_served_until_the_done_signal() {
    let browser = ScriptedBrowser {
        extra_paths: vec![IMAGE_PATH, "/HTTP%3A%2F%2FEXAMPLE.COM%2FIMG%2FLOGO.PNG"],
        send_done_signal: true,
        ..ScriptedBrowser::default()
    };

    let reason = run(PAGE_WITH_IMAGE.as_bytes(), &browser, quick_config());
    assert_eq!(reason, ShutdownReason::DoneSignal);

    let page = browser.page();
    assert_eq!(page.status, 200);
    assert!(page.head.contains("Content-Type: text/html"));
    let html = String::from_utf8_lossy(&page.body).into_owned();
    assert!(html.contains(&format!("src=\"{IMAGE_PATH}\"")));
    assert!(html.contains("req.open('GET', '/done-signal');"));

    let image = browser.fetched(IMAGE_PATH);
    assert_eq!(image.status, 200);
    assert!(image.head.contains("Content-Type: image/png"));
    assert_eq!(image.body, b"\x89PNG\r\n".to_vec());

    let shouted = browser.fetched("/HTTP%3A%2F%2FEXAMPLE.COM%2FIMG%2FLOGO.PNG");
    assert_eq!(shouted.status, 200);
    assert_eq!(shouted.body, image.body);
}

#[test]
fn unknown_resources_are_not_found() {
    let browser = ScriptedBrowser {
        extra_paths: vec!["/http%3A%2F%2Fexample.com%2Fmissing.css"],
        send_done_signal: true,
        ..ScriptedBrowser::default()
    };

    run(PAGE_WITH_IMAGE.as_bytes(), &browser, quick_config());
    assert_eq!(
        browser.fetched("/http%3A%2F%2Fexample.com%2Fmissing.css").status,
        404
    );
}

#[test]
fn silent_browser_times_out() {
    let browser = ScriptedBrowser::default();
    let config = ViewerConfig {
        timeout: Duration::from_millis(50),
        open_browser: true,
    };

    assert_eq!(
        run(PAGE_WITH_IMAGE.as_bytes(), &browser, config),
        ShutdownReason::Timeout
    );
}

#[test]
fn failed_launch_waits_without_a_deadline() {
    let browser = ScriptedBrowser {
        send_done_signal: true,
        fail_launch: true,
        ..ScriptedBrowser::default()
    };
    let config = ViewerConfig {
        timeout: Duration::from_millis(1),
        open_browser: true,
    };

    assert_eq!(
        run(PAGE_WITH_IMAGE.as_bytes(), &browser, config),
        ShutdownReason::DoneSignal
    );
    assert_eq!(browser.page().status, 200);
}

#[test]
fn base_element_redirects_relative_references() {
    let raw = "Content-Type: multipart/related; boundary=b\r\n\r\n\
--b\r\nContent-Type: text/html\r\nContent-Location: http://example.com/page/\r\n\r\n\
<html><head><base href=\"http://cdn.example.com/assets/\"></head>\
<body><img src=\"logo.png\"></body></html>\r\n\
--b\r\nContent-Type: image/png\r\nContent-Location: http://cdn.example.com/assets/logo.png\r\n\r\n\
png\r\n\
--b--\r\n";
    let browser = ScriptedBrowser {
        extra_paths: vec!["/http%3A%2F%2Fcdn.example.com%2Fassets%2Flogo.png"],
        send_done_signal: true,
        ..ScriptedBrowser::default()
    };

    run(raw.as_bytes(), &browser, quick_config());

    let html = String::from_utf8_lossy(&browser.page().body).into_owned();
    assert!(!html.contains("<base"));
    assert!(html.contains("src=\"/http%3A%2F%2Fcdn.example.com%2Fassets%2Flogo.png\""));
    let image = browser.fetched("/http%3A%2F%2Fcdn.example.com%2Fassets%2Flogo.png");
    assert_eq!(image.body, b"png".to_vec());
}

#[test]
fn declared_legacy_charset_is_served_as_utf8() {
    let raw = "Content-Type: multipart/related; boundary=b\r\n\r\n\
--b\r\nContent-Type: text/html; charset=iso-8859-1\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
Content-Location: http://example.com/\r\n\r\n\
<html><head></head><body>caf=E9</body></html>\r\n\
--b--\r\n";
    let browser = ScriptedBrowser {
        send_done_signal: true,
        ..ScriptedBrowser::default()
    };

    run(raw.as_bytes(), &browser, quick_config());

    let page = browser.page();
    assert!(!page.head.contains("charset"));
    let html = match String::from_utf8(page.body) {
        Ok(html) => html,
        Err(error) => panic!("{error}"),
    };
    assert!(html.contains("café"));
}
