use clap::CommandFactory;
use clap::Parser;
use mv_viewer::SystemBrowser;
use mv_viewer::Viewer;
use mv_viewer::ViewerConfig;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Serves a saved MHTML archive on loopback and opens it in the browser.
#[derive(Debug, Parser)]
#[command(name = "mhtview", version, about)]
struct Cli {
    /// How long to keep serving after the browser was opened (`15s`, `2m`).
    #[arg(
        short = 't',
        long,
        value_name = "DURATION",
        value_parser = humantime::parse_duration,
        default_value = "15s"
    )]
    timeout: Duration,

    /// Print the URL instead of launching a browser.
    #[arg(long)]
    no_browser: bool,

    /// Archive to view; exactly one is required.
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let [path] = cli.files.as_slice() else {
        eprintln!("{}", Cli::command().render_usage());
        return ExitCode::SUCCESS;
    };

    let config = ViewerConfig {
        timeout: cli.timeout,
        open_browser: !cli.no_browser,
    };

    let result = mv_viewer::load_archive(path)
        .and_then(|catalog| Viewer::new(config, SystemBrowser).run(catalog));
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            error!(path = %path.display(), "{error}");
            if error.is_in("archive") {
                info!("expected a MIME multipart archive such as a saved .mht or .mhtml page");
            }
            ExitCode::FAILURE
        }
    }
}
