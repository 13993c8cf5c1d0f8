//! SafeCampus worker host.
//!
//! Drives the worker core from the command line: each invocation dispatches
//! one platform event against the on-disk cache and alert queue, then waits
//! for the event's lifetime to settle before exiting.

mod platform;

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use safecampus_core::cache::{CacheStorage, DiskCacheStorage};
use safecampus_core::emergency::EmergencyFlow;
use safecampus_core::lifecycle::{spawn_update_checker, WorkerState};
use safecampus_core::models::{EmergencyAlert, Method, Request};
use safecampus_core::network::{HttpNetwork, Network};
use safecampus_core::notify::{NotificationAction, NOTIFICATION_TAG};
use safecampus_core::platform::{Clients, LocationProvider, NotificationSink, Registration, SyncRegistrar};
use safecampus_core::state::LocalState;
use safecampus_core::sync::{AlertDelivery, HttpAlertDelivery, JsonAlertStore, SyncQueue};
use safecampus_core::{Outcome, Worker, WorkerConfig, WorkerEvent, WorkerParts};

use platform::{ConfigRegistration, DeferredSync, EnvLocation, HeadlessClients, LogNotificationSink};

// ============================================================================
// Constants
// ============================================================================

/// Origin used when neither the config nor the environment names one
const DEFAULT_ORIGIN: &str = "http://localhost:8080";

/// Overrides `origin` from the config file
const ORIGIN_ENV: &str = "SAFECAMPUS_ORIGIN";

/// Set to `1` to also log to a daily rolling file under the cache directory
const LOG_FILE_ENV: &str = "SAFECAMPUS_LOG_FILE";

const USAGE: &str = "usage: safecampus-worker <command>

commands:
  install               precache the static manifest, then activate
  activate              delete stale cache tiers and claim pages
  fetch <path> [--navigate] [--method <method>]
                        route one request through the worker and print the body
  drain                 retry queued emergency alerts
  enqueue <contacts-json>
                        queue an alert for the given contacts
  trigger               run the emergency button flow with saved contacts
  push [payload]        deliver a push message and show the notification
  click [view|dismiss]  click the emergency notification or one of its actions
  watch                 check for a new worker version until interrupted
  status                print worker status as JSON
  version               print the worker version";

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: &Path) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = if std::env::var(LOG_FILE_ENV).is_ok_and(|v| v == "1") {
        let appender = tracing_appender::rolling::daily(log_dir.join("logs"), "safecampus-worker.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Install,
    Activate,
    Fetch { path: String, navigate: bool, method: Method },
    Drain,
    Enqueue(String),
    Trigger,
    Push(Option<String>),
    Click(Option<NotificationAction>),
    Watch,
    Status,
    Version,
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some(command) = args.first() else {
        bail!("{}", USAGE);
    };
    let command = match command.as_str() {
        "install" => Command::Install,
        "activate" => Command::Activate,
        "fetch" => {
            let path = args.get(1).context("fetch needs a path")?.clone();
            let mut navigate = false;
            let mut method = Method::Get;
            let mut rest = args[2..].iter();
            while let Some(flag) = rest.next() {
                match flag.as_str() {
                    "--navigate" => navigate = true,
                    "--method" => {
                        let name = rest.next().context("--method needs a value")?;
                        method = Method::parse(name).with_context(|| format!("unknown method '{}'", name))?;
                    }
                    other => bail!("unknown fetch flag '{}'", other),
                }
            }
            Command::Fetch { path, navigate, method }
        }
        "drain" => Command::Drain,
        "enqueue" => Command::Enqueue(args.get(1).context("enqueue needs a contacts JSON payload")?.clone()),
        "trigger" => Command::Trigger,
        "push" => Command::Push(args.get(1).cloned()),
        // Unknown actions count as a click on the notification body
        "click" => Command::Click(args.get(1).and_then(|a| NotificationAction::parse(a))),
        "watch" => Command::Watch,
        "status" => Command::Status,
        "version" => Command::Version,
        other => bail!("unknown command '{}'\n\n{}", other, USAGE),
    };
    Ok(command)
}

async fn run(worker: &Worker, event: WorkerEvent) -> Outcome {
    let dispatch = worker.dispatch(event).await;
    let settled = dispatch.lifetime.settle().await;
    if settled.panicked > 0 {
        warn!(panicked = settled.panicked, "Some handler work did not complete");
    }
    dispatch.outcome
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;

    let mut config = WorkerConfig::load()?;
    if let Ok(origin) = std::env::var(ORIGIN_ENV) {
        config.origin = Some(origin);
    }
    let cache_dir = config.cache_dir()?;
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("Failed to create cache directory: {}", cache_dir.display()))?;
    let _log_guard = init_tracing(&cache_dir);

    let origin = config.origin.clone().unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
    let config = Arc::new(config);
    info!(version = %config.version, origin = %origin, "Starting worker host");

    let storage: Arc<dyn CacheStorage> = Arc::new(DiskCacheStorage::new(&cache_dir)?);
    let network: Arc<dyn Network> = Arc::new(HttpNetwork::with_timeout(config.request_timeout())?);
    let delivery: Arc<dyn AlertDelivery> = Arc::new(HttpAlertDelivery::new(&origin)?);
    let queue = SyncQueue::new(Arc::new(JsonAlertStore::new(&cache_dir)?), Arc::clone(&delivery));
    let parts = WorkerParts::new(
        Arc::clone(&config),
        storage,
        network,
        Arc::new(HeadlessClients) as Arc<dyn Clients>,
        Arc::new(LogNotificationSink) as Arc<dyn NotificationSink>,
        queue.clone(),
    );
    let worker = Worker::new(parts, &origin)?;

    match command {
        Command::Install => {
            run(&worker, WorkerEvent::Install).await;
            if worker.lifecycle().state() != WorkerState::Installed {
                bail!("install of {} failed, previous version stays active", config.version);
            }
            if worker.lifecycle().skip_waiting_requested() {
                run(&worker, WorkerEvent::Activate).await;
            }
            println!("{}", worker.lifecycle().state());
        }
        Command::Activate => {
            run(&worker, WorkerEvent::Activate).await;
            println!("{}", worker.lifecycle().state());
        }
        Command::Fetch { path, navigate, method } => {
            let url = Request::get(&origin)?.sibling(&path)?.url;
            let mut request = if navigate {
                Request::navigate(url.as_str())?
            } else {
                Request::get(url.as_str())?
            };
            request.method = method;
            match run(&worker, WorkerEvent::Fetch(request)).await {
                Outcome::Response(response) => {
                    eprintln!("{} {}", response.status, url);
                    println!("{}", response.text());
                }
                Outcome::Passthrough => println!("not intercepted"),
                Outcome::Failed(e) => bail!(e),
                Outcome::Handled => {}
            }
        }
        Command::Drain => {
            let result = queue.drain().await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Enqueue(payload) => {
            let contacts: serde_json::Value =
                serde_json::from_str(&payload).context("Failed to parse contacts JSON")?;
            let alert = queue.enqueue(EmergencyAlert::new(None, contacts)).await?;
            run(&worker, WorkerEvent::Sync("emergency-alert".to_string())).await;
            println!("{}", alert.id);
        }
        Command::Trigger => {
            let state = Arc::new(LocalState::new(cache_dir.join("state"))?);
            let flow = EmergencyFlow::new(
                Arc::new(EnvLocation) as Arc<dyn LocationProvider>,
                delivery,
                queue,
                Arc::new(DeferredSync) as Arc<dyn SyncRegistrar>,
                state,
            );
            let outcome = flow.trigger().await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Push(payload) => {
            run(&worker, WorkerEvent::Push(payload.map(String::into_bytes))).await;
        }
        Command::Click(action) => {
            run(
                &worker,
                WorkerEvent::NotificationClick {
                    action,
                    tag: NOTIFICATION_TAG.to_string(),
                },
            )
            .await;
        }
        Command::Watch => {
            let registration = Arc::new(ConfigRegistration::new(&config.version)) as Arc<dyn Registration>;
            let checker = spawn_update_checker(registration, config.update_interval());
            eprintln!(
                "watching for updates every {}s, ctrl-c to stop",
                config.update_interval().as_secs()
            );
            tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
            checker.abort();
        }
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&worker.status().await)?);
        }
        Command::Version => println!("{}", worker.version()),
    }

    Ok(())
}
