//! Opening the served document in the user's browser.

use mv_core::ViewerError;
use mv_core::ViewerResult;
use std::process::Command;
use std::process::Stdio;

/// Something that can show a URL to the user.
pub trait BrowserLauncher {
    fn open(&self, url: &str) -> ViewerResult<()>;
}

/// Launches the platform's default browser through its URL opener.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> ViewerResult<()> {
        let (program, args) = opener_command(url);

        let mut command = Command::new(program);
        command.args(&args);
        command.stdin(Stdio::null());
        command.stdout(Stdio::null());
        command.stderr(Stdio::null());

        let status = command.status().map_err(|error| {
            ViewerError::new(
                "browser.spawn_failed",
                format!("failed to run `{program}`: {error}"),
            )
        })?;

        if !status.success() {
            return Err(ViewerError::new(
                "browser.open_failed",
                format!("`{program}` exited with {status}"),
            ));
        }
        Ok(())
    }
}

fn opener_command(url: &str) -> (&'static str, Vec<String>) {
    if cfg!(target_os = "windows") {
        // The empty argument is the window title `start` expects first.
        (
            "cmd",
            vec![
                "/C".to_owned(),
                "start".to_owned(),
                String::new(),
                url.to_owned(),
            ],
        )
    } else if cfg!(target_os = "macos") {
        ("open", vec![url.to_owned()])
    } else {
        ("xdg-open", vec![url.to_owned()])
    }
}
