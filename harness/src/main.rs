mod window;

use motion_harness_common::config::{Config, ConfigError};
use motion_harness_pipeline::lifecycle::LifecycleOwner;
use motion_harness_pipeline::media::{MediaLocator, PipelineError};
use motion_harness_pipeline::synthetic::SyntheticBuilder;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use window::ConsoleWindow;

const DEFAULT_CONFIG: &str = "harness.toml";

#[derive(Debug, thiserror::Error)]
enum ArgsError {
    #[error("Usage: motion-harness <url> [config.toml]")]
    Usage,
    #[error(transparent)]
    Locator(#[from] PipelineError),
}

/// A missing argument or one without a colon is a usage error.
fn parse_locator(arg: Option<&str>) -> Result<MediaLocator, ArgsError> {
    match arg {
        Some(url) if url.contains(':') => Ok(MediaLocator::parse(url)?),
        _ => Err(ArgsError::Usage),
    }
}

#[tokio::main]
async fn main() {
    let mut args = std::env::args().skip(1);

    let locator = match parse_locator(args.next().as_deref()) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(0);
        }
    };

    let config = match load_config(args.next().map(PathBuf::from)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        %locator,
        wait_timeout_secs = config.harness.wait_timeout_secs,
        frames = config.synthetic.frame_count,
        "starting motion harness"
    );

    let runtime = tokio::runtime::Handle::current();
    let mut owner = LifecycleOwner::new(
        Box::new(SyntheticBuilder::new(config.synthetic.clone())),
        &config,
    );

    // The owner blocks on the state gate, so it gets a thread of its own.
    let outcome = tokio::task::spawn_blocking(move || {
        let mut window = ConsoleWindow::new(runtime, locator.to_string());
        let cause = owner.run(&locator, &mut window);
        window.report();
        cause
    })
    .await;

    match outcome {
        Ok(cause) => info!(?cause, "motion harness finished"),
        Err(e) => error!(error = %e, "lifecycle task failed"),
    }
    std::process::exit(0);
}

fn load_config(path: Option<PathBuf>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => Config::load(&path),
        None if Path::new(DEFAULT_CONFIG).exists() => Config::load(Path::new(DEFAULT_CONFIG)),
        None => Ok(Config::default()),
    }
}
