//! Phone keypad CLI - drives the offline worker and the typing sequencer
//! from a terminal.
//!
//! The worker commands operate on the on-disk buckets in the user's cache
//! directory, so `install` followed by `fetch` behaves like a browser that
//! has the app installed and then goes offline.

mod terminal;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use keypad_core::http::{Destination, Fetcher, HttpFetcher, Request, RequestMode};
use keypad_core::typing::TriggerOutcome;
use keypad_core::{
    tel_uri, CacheStoreManager, CalibrationStore, Config, DiskStorage, LocalStore, Nudge,
    ServiceWorker, TypingSequencer,
};

use terminal::{TerminalClipboard, TerminalKeypad};

#[derive(Parser)]
#[command(name = "keypad", version, about = "Phone keypad offline worker and typing sequencer")]
struct Cli {
    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Precache the asset manifest into the current bucket
    Install {
        /// Leave the new version waiting instead of activating it
        #[arg(long)]
        no_activate: bool,
    },
    /// Delete every bucket except the current version
    Activate,
    /// Route one request through the worker
    Fetch {
        url: String,
        /// Treat as a top-level page load
        #[arg(long)]
        navigate: bool,
        /// Accept header to send
        #[arg(long)]
        accept: Option<String>,
        /// Declare the request as an image load
        #[arg(long)]
        image: bool,
        #[arg(long, default_value = "GET")]
        method: String,
        /// Print the response body to stdout
        #[arg(long)]
        body: bool,
    },
    /// List cache buckets on disk
    Buckets,
    /// Check a control message (JSON) against a fresh worker.
    ///
    /// The worker lives only for this command, so an accepted message has no
    /// lasting effect. Use `install` to install and activate in one step.
    Message { payload: String },
    /// Replay a phone number onto the keypad with typing delays
    Type {
        /// Clipboard text; read from stdin when omitted
        #[arg(long)]
        text: Option<String>,
    },
    /// Print the tel: link for a number
    Dial { number: String },
    /// Show or adjust the overlay calibration
    Calibrate {
        #[arg(value_enum, default_value_t = CalibrateAction::Show)]
        action: CalibrateAction,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CalibrateAction {
    Show,
    Up,
    Down,
    Left,
    Right,
    Reset,
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "keypad.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_ref());

    let config = Config::load().context("Failed to load configuration")?;
    debug!(scope = %config.scope, version = %config.cache_version, "Configuration loaded");

    match cli.command {
        Command::Install { no_activate } => install(&config, no_activate).await,
        Command::Activate => activate(&config).await,
        Command::Fetch {
            url,
            navigate,
            accept,
            image,
            method,
            body,
        } => {
            let request = build_request(&url, &method, navigate, accept.as_deref(), image)?;
            fetch(&config, request, body).await
        }
        Command::Buckets => buckets(&config),
        Command::Message { payload } => message(&config, &payload),
        Command::Type { text } => type_number(&config, text).await,
        Command::Dial { number } => {
            match tel_uri(&number) {
                Some(uri) => println!("{}", uri),
                None => eprintln!("Nothing to dial."),
            }
            Ok(())
        }
        Command::Calibrate { action } => calibrate(action),
    }
}

fn build_worker(config: &Config) -> Result<(ServiceWorker, Arc<HttpFetcher>)> {
    let storage = Arc::new(
        DiskStorage::new(config.bucket_dir()?).context("Failed to open cache directory")?,
    );
    let cache = CacheStoreManager::new(storage, &config.cache_prefix, &config.cache_version);
    let fetcher = Arc::new(
        HttpFetcher::with_timeout(config.request_timeout())
            .context("Failed to create HTTP client")?,
    );
    let worker = ServiceWorker::new(cache, fetcher.clone(), config.manifest()?);
    Ok((worker, fetcher))
}

fn build_request(
    url: &str,
    method: &str,
    navigate: bool,
    accept: Option<&str>,
    image: bool,
) -> Result<Request> {
    let url = url::Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;
    let mut request = Request::new(method, url);
    if navigate {
        request = request
            .with_mode(RequestMode::Navigate)
            .with_destination(Destination::Document);
    }
    if let Some(accept) = accept {
        request = request.with_header("accept", accept);
    }
    if image {
        request = request.with_destination(Destination::Image);
    }
    Ok(request)
}

async fn install(config: &Config, no_activate: bool) -> Result<()> {
    let (worker, _) = build_worker(config)?;
    let report = worker.on_install().await;

    println!(
        "Installed {} ({} cached, {} skipped)",
        worker.cache().bucket(),
        report.cached.len(),
        report.skipped.len()
    );
    for url in &report.skipped {
        println!("  skipped {}", url);
    }

    if !no_activate && worker.ready_to_activate() {
        let activated = worker.on_activate().await;
        print_activation(&activated.deleted);
    }
    Ok(())
}

async fn activate(config: &Config) -> Result<()> {
    let (worker, _) = build_worker(config)?;
    let report = worker.on_activate().await;
    print_activation(&report.deleted);
    Ok(())
}

fn print_activation(deleted: &[String]) {
    if deleted.is_empty() {
        println!("Activated, no stale buckets");
    } else {
        println!("Activated, deleted {}", deleted.join(", "));
    }
}

async fn fetch(config: &Config, request: Request, print_body: bool) -> Result<()> {
    let (worker, fetcher) = build_worker(config)?;

    let (response, source) = match worker.on_fetch(&request).await {
        Some(outcome) => {
            if let Some(refresh) = outcome.revalidation {
                // Keep the process alive until the background refresh settles.
                let _ = refresh.await;
            }
            (outcome.response, format!("{:?}", outcome.source))
        }
        None => {
            info!(method = %request.method, "Request not intercepted, going to network");
            let response = fetcher
                .fetch(&request)
                .await
                .with_context(|| format!("Failed to fetch {}", request.url))?;
            (response, "Bypass".to_string())
        }
    };

    eprintln!(
        "{} {} ({} bytes, from {})",
        response.status,
        response.status_text,
        response.body.len(),
        source
    );
    if print_body {
        println!("{}", response.text());
    }
    Ok(())
}

fn buckets(config: &Config) -> Result<()> {
    let storage = DiskStorage::new(config.bucket_dir()?)?;
    let current = keypad_core::cache::bucket_name(&config.cache_prefix, &config.cache_version);
    let infos = storage.describe()?;
    if infos.is_empty() {
        println!("No cache buckets in {}", storage.dir().display());
    }
    for info in infos {
        let marker = if info.name == current { "*" } else { " " };
        println!(
            "{} {} ({} entries, created {})",
            marker,
            info.name,
            info.entries,
            info.age_display()
        );
    }
    Ok(())
}

fn message(config: &Config, payload: &str) -> Result<()> {
    let (worker, _) = build_worker(config)?;
    if worker.on_message(payload) {
        println!("Message accepted");
    } else {
        println!("Message ignored");
    }
    Ok(())
}

async fn type_number(config: &Config, text: Option<String>) -> Result<()> {
    let surface = Arc::new(TerminalKeypad::new());
    let sequencer = TypingSequencer::new(
        Arc::new(TerminalClipboard::new(text)),
        surface.clone(),
        config.typing(),
    );

    let trigger = sequencer.trigger();
    tokio::pin!(trigger);

    let outcome = tokio::select! {
        outcome = &mut trigger => outcome,
        _ = tokio::signal::ctrl_c() => {
            sequencer.cancel();
            trigger.await
        }
    };

    println!();
    match outcome {
        TriggerOutcome::Completed { emitted } => eprintln!("Typed {} characters", emitted),
        TriggerOutcome::Aborted { emitted } => eprintln!("Stopped after {} characters", emitted),
        TriggerOutcome::ClipboardUnavailable => eprintln!("Could not read clipboard text"),
        TriggerOutcome::NothingToType => eprintln!("No phone number found"),
        TriggerOutcome::AbortRequested => {}
    }
    if let Some(uri) = surface.keypad().tel_uri() {
        println!("{}", uri);
    }
    Ok(())
}

fn calibrate(action: CalibrateAction) -> Result<()> {
    let store = CalibrationStore::new(LocalStore::new(Config::storage_path()?));
    let mut calibration = store.load();

    let nudge = match action {
        CalibrateAction::Show => None,
        CalibrateAction::Up => Some(Nudge::Up),
        CalibrateAction::Down => Some(Nudge::Down),
        CalibrateAction::Left => Some(Nudge::Left),
        CalibrateAction::Right => Some(Nudge::Right),
        CalibrateAction::Reset => {
            calibration = Default::default();
            store.save(&calibration);
            None
        }
    };
    if let Some(direction) = nudge {
        calibration.nudge(direction);
        store.save(&calibration);
    }

    println!("Calibration: x={}px y={}px", calibration.x, calibration.y);
    Ok(())
}
