//! Subcommand implementations.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use fanos_config_and_utils::{FanosConfig, Paths};
use fanos_lifecycle::{LifecycleBus, LifecycleEvent};
use fanos_outbox::{Fanos, OutboxError, Request, SchedulerState, SendOptions};
use fanos_storage::{FileStore, KeyValueStore};
use fanos_transport::{HttpBeaconSender, ReqwestSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type CliResult<T> = Result<T, Box<dyn Error>>;

/// How often `send` checks whether retries have settled.
const SETTLE_POLL: Duration = Duration::from_millis(250);

/// How long accepted beacons get to leave before the process exits.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Parsed arguments for `fanos send`.
#[derive(Debug)]
pub struct SendArgs {
    pub data: serde_json::Value,
    pub options: SendOptions,
}

impl SendArgs {
    pub fn parse(url: Option<String>, headers: &[String], data: &str) -> CliResult<Self> {
        let mut options = SendOptions::new();
        if let Some(url) = url {
            options = options.url(url);
        }
        for raw in headers {
            let (name, value) = parse_header(raw)?;
            options = options.header(name, value);
        }

        let text = match data.strip_prefix('@') {
            Some(path) => std::fs::read_to_string(path)?,
            None => data.to_string(),
        };
        let data = serde_json::from_str(&text)?;

        Ok(Self { data, options })
    }
}

fn parse_header(raw: &str) -> CliResult<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("Invalid header {raw:?}, expected NAME:VALUE"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("Invalid header {raw:?}, empty name").into());
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// A file-backed instance plus what is needed to shut it down cleanly.
struct Session {
    fanos: Fanos,
    bus: LifecycleBus,
    drain: JoinHandle<()>,
}

impl Session {
    fn open(config: FanosConfig, paths: &Paths) -> CliResult<Self> {
        let store = FileStore::open(paths.store_dir())?;
        let reliable = ReqwestSender::new()?;
        let (beacon, drain) = HttpBeaconSender::spawn(reliable.client().clone());
        let bus = LifecycleBus::new();

        let fanos = Fanos::builder()
            .config(config)
            .beacon(Arc::new(beacon))
            .reliable(Arc::new(reliable))
            .store(Arc::new(store))
            .notifier(Arc::new(bus.clone()))
            .build()?;

        Ok(Self { fanos, bus, drain })
    }

    /// Persist whatever is left, then let accepted beacons go out.
    async fn close(self) {
        let Session { fanos, bus, drain } = self;

        if fanos.queue_len() > 0 {
            let outcome = fanos.persist_now();
            info!(queued = fanos.queue_len(), ?outcome, "Queue saved for a later flush");
        } else {
            fanos.destroy();
        }

        // Dropping the last handle closes the beacon channel.
        drop(fanos);
        drop(bus);
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            warn!("Timed out waiting for beacons to leave");
        }
    }
}

pub async fn send(config: FanosConfig, paths: &Paths, args: SendArgs) -> CliResult<()> {
    let session = Session::open(config, paths)?;

    match session.fanos.send(args.data, args.options).await {
        Ok(()) => println!("delivered"),
        Err(OutboxError::DeliveryFailed { request_id }) => {
            println!("queued {request_id}, retrying (Ctrl-C to stop)");
            tokio::select! {
                _ = wait_until_settled(&session.fanos) => {}
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!(error = %e, "Failed to listen for Ctrl-C");
                    }
                    unload(&session).await;
                }
            }
            println!("{} request(s) still queued", session.fanos.queue_len());
        }
        Err(e) => return Err(e.into()),
    }

    session.close().await;
    Ok(())
}

/// Resolve once the retry scheduler has stopped or the queue is empty.
async fn wait_until_settled(fanos: &Fanos) {
    loop {
        if fanos.queue_len() == 0 {
            return;
        }
        if !matches!(fanos.scheduler_state(), SchedulerState::Scheduled(_)) {
            return;
        }
        tokio::time::sleep(SETTLE_POLL).await;
    }
}

/// Treat Ctrl-C as the host unloading: listeners get their last chance to
/// flush, and this pass waits behind theirs.
async fn unload(session: &Session) {
    let handlers = session.bus.emit(LifecycleEvent::BeforeUnload);
    debug!(handlers, "Unload event delivered");
    session.fanos.flush().await;
}

pub async fn flush(config: FanosConfig, paths: &Paths) -> CliResult<()> {
    let session = Session::open(config, paths)?;
    session.fanos.initialize();

    let report = session.fanos.flush().await;
    println!(
        "attempted {}, delivered {}, dropped {}, remaining {}",
        report.attempted, report.delivered, report.exhausted, report.remaining
    );

    session.close().await;
    Ok(())
}

pub fn status(config: &FanosConfig, paths: &Paths) -> CliResult<()> {
    let store = FileStore::open(paths.store_dir())?;
    let requests: Vec<Request> = match store.get(&config.store_key)? {
        Some(raw) => serde_json::from_str(&raw)?,
        None => Vec::new(),
    };

    println!("{} request(s) queued", requests.len());
    for request in &requests {
        println!(
            "  {}  attempts={}  url={}  kind={}",
            request.id,
            request.attempts,
            request.url.as_deref().unwrap_or("-"),
            request.data.kind()
        );
    }
    Ok(())
}

pub async fn clear(config: FanosConfig, paths: &Paths) -> CliResult<()> {
    let session = Session::open(config, paths)?;
    session.fanos.initialize();
    let dropped = session.fanos.queue_len();
    session.fanos.destroy();
    println!("cleared {dropped} request(s)");

    session.close().await;
    Ok(())
}
