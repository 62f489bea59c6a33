use std::{path::PathBuf, sync::Arc, time::Duration};

use accumulator::{AccumulatorSettings, TimeAccumulator, TimeReport};
use anyhow::Result;
use config::TrackerConfig;
use focus::rules::RuleSynthesizer;
use ipc::{local_address, server::IpcServer};
use polling::{category_job, focus_job, poller::Poller};
use processing::{remote_log::RemoteTimeLogger, ProcessingModule};
use storage::{
    local::LocalStorage,
    store::{JsonFileStore, KeyValueStore},
};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracker::{Tracker, TrackerEvent};

use crate::{
    browser_api::{ruleset::RulesetFile, RuleSink},
    remote::{http::HttpTrackerApi, TrackerApi},
    utils::clock::{Clock, DefaultClock},
};

pub mod accumulator;
pub mod alerts;
pub mod args;
pub mod config;
pub mod focus;
pub mod ipc;
pub mod polling;
pub mod processing;
pub mod shutdown;
pub mod storage;
pub mod tracker;

pub const STORE_FILE_NAME: &str = "storage.json";
pub const RULESET_FILE_NAME: &str = "rules.json";

const EVENT_BUFFER: usize = 32;

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf, config: TrackerConfig) -> Result<()> {
    std::env::set_current_dir("/")?;

    let shutdown_token = CancellationToken::new();
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let api: Arc<dyn TrackerApi> = Arc::new(HttpTrackerApi::new(
        &config.server_url,
        config.request_timeout(),
    )?);

    let store = JsonFileStore::open(dir.join(STORE_FILE_NAME)).await?;
    let rules = RulesetFile::open(dir.join(RULESET_FILE_NAME)).await?;

    let (event_sender, event_receiver) = mpsc::channel::<TrackerEvent>(EVENT_BUFFER);
    let (report_sender, report_receiver) = mpsc::unbounded_channel::<TimeReport>();
    let (user_sender, user_receiver) = watch::channel(config.user_id);

    let tracker = create_tracker(
        store,
        rules,
        api.clone(),
        clock.clone(),
        report_sender,
        user_sender,
        &config,
    )
    .await?;
    let processor = ProcessingModule::new(report_receiver, RemoteTimeLogger::new(api.clone()));
    let server = IpcServer::bind(
        local_address(config.listen_port),
        event_sender.clone(),
        shutdown_token.clone(),
    )
    .await?;

    let category_poller = Poller::new(
        "categories",
        event_sender.clone(),
        category_job(api.clone()),
        shutdown_token.clone(),
        config.category_refresh(),
        clock.clone(),
    );
    let focus_poller = Poller::new(
        "focus",
        event_sender.clone(),
        focus_job(api.clone()),
        shutdown_token.clone(),
        config.focus_poll(),
        clock.clone(),
    );
    let alert_poller = Poller::new(
        "alerts",
        event_sender,
        alerts::alert_job(api, user_receiver),
        shutdown_token.clone(),
        config.alert_check(),
        clock,
    );

    info!("Daemon started, reporting to {}", config.server_url);
    let (_, tracker_result, processing_result, server_result, categories, focus, alerts) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        tracker.run(event_receiver, shutdown_token.clone(), config.flush_interval()),
        processor.run(),
        server.run(),
        category_poller.run(),
        focus_poller.run(),
        alert_poller.run(),
    );

    for (module, result) in [
        ("Tracker", tracker_result),
        ("Processing module", processing_result),
        ("Message server", server_result),
        ("Category poller", categories),
        ("Focus poller", focus),
        ("Alert poller", alerts),
    ] {
        if let Err(e) = result {
            error!("{module} got an error {e:?}");
        }
    }

    Ok(())
}

async fn create_tracker<S: KeyValueStore, R: RuleSink>(
    store: S,
    rules: R,
    api: Arc<dyn TrackerApi>,
    clock: Arc<dyn Clock>,
    reports: mpsc::UnboundedSender<TimeReport>,
    user: watch::Sender<Option<u64>>,
    config: &TrackerConfig,
) -> Result<Tracker<S, R>> {
    let settings = AccumulatorSettings {
        max_delta: Duration::from_secs(config.max_delta_secs),
        min_flush_spacing: Duration::from_secs(config.min_flush_spacing_secs),
    };
    let mut tracker = Tracker::new(
        LocalStorage::new(store),
        rules,
        api,
        clock,
        TimeAccumulator::new(settings, reports),
        RuleSynthesizer::new(config.blocked_page()?, config.max_rules),
        user,
    );
    tracker.restore(config.user_id).await?;
    Ok(tracker)
}
