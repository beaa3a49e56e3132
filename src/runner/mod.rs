//! The `runner` module drives a whole load-test run.
//!
//! Simulated things are spawned at the configured hatch rate, each with its
//! own session and [`LoadClient`]. All of them report into one collector.
//! The run ends when the duration elapses or the `stop` future resolves;
//! every thing is then stopped and disconnected, and the statistics are
//! returned together with the number of operations left unacknowledged.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::LoadClient;
use crate::config::Settings;
use crate::outcome::{ChannelSink, OutcomeEvent};
use crate::scenario::ThingBehavior;
use crate::session::RumqttSession;
use crate::stats::{self, RunStats};
use crate::utils::LoadError;

/// Rejects settings no run can be started with.
pub fn validate(settings: &Settings) -> Result<(), LoadError> {
    if settings.broker.host.is_empty() {
        return Err(LoadError::InvalidSetting("broker.host must not be empty".to_string()));
    }
    if settings.broker.port == 0 {
        return Err(LoadError::InvalidSetting("broker.port must not be 0".to_string()));
    }
    hatch_interval(settings.load.hatch_rate)?;
    Ok(())
}

/// Delay between two thing starts at `rate` things per second.
pub fn hatch_interval(rate: f64) -> Result<Duration, LoadError> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(LoadError::InvalidSetting(format!(
            "load.hatch_rate must be a positive number, got {rate}"
        )));
    }
    Duration::try_from_secs_f64(1.0 / rate).map_err(|_| {
        LoadError::InvalidSetting(format!("load.hatch_rate {rate} is too small"))
    })
}

/// Runs the load test described by `settings`.
///
/// A `duration_secs` of 0 runs until `stop` resolves.
pub async fn run<F>(settings: Settings, stop: F) -> Result<RunStats, LoadError>
where
    F: Future<Output = ()>,
{
    validate(&settings)?;
    let interval = hatch_interval(settings.load.hatch_rate)?;
    let behavior = Arc::new(ThingBehavior::from_settings(&settings)?);
    let settings = Arc::new(settings);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let collector = tokio::spawn(stats::collect(events_rx));
    let (stop_tx, stop_rx) = watch::channel(false);

    info!(
        "Starting {} thing(s) at {}/s against {}:{}",
        settings.load.users, settings.load.hatch_rate, settings.broker.host, settings.broker.port
    );
    let hatcher = tokio::spawn(hatch(settings.clone(), interval, behavior, events_tx, stop_rx));

    let duration_secs = settings.load.duration_secs;
    let time_limit = async move {
        if duration_secs == 0 {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(Duration::from_secs(duration_secs)).await;
    };

    tokio::select! {
        _ = stop => info!("Stop requested"),
        _ = time_limit => info!("Run time of {}s reached", duration_secs),
    }
    let _ = stop_tx.send(true);

    let things = hatcher.await?;
    let mut pending = 0;
    for result in join_all(things).await {
        pending += result?;
    }
    if pending > 0 {
        warn!("{} operation(s) unacknowledged at shutdown", pending);
    }

    let mut stats = collector.await?;
    stats.set_pending_at_shutdown(pending);
    Ok(stats)
}

async fn hatch(
    settings: Arc<Settings>,
    interval: Duration,
    behavior: Arc<ThingBehavior>,
    events: UnboundedSender<OutcomeEvent>,
    mut stop: watch::Receiver<bool>,
) -> Vec<JoinHandle<usize>> {
    let users = settings.load.users;
    let mut things = Vec::with_capacity(users);

    for n in 0..users {
        if *stop.borrow() {
            break;
        }
        let id = format!("{}-{}", settings.load.client_id_prefix, Uuid::new_v4());
        let sink = ChannelSink::new(events.clone());
        things.push(tokio::spawn(run_thing(
            id,
            settings.clone(),
            behavior.clone(),
            sink,
            stop.clone(),
        )));

        if n + 1 < users {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = stop.changed() => break,
            }
        }
    }
    debug!("hatched {} thing(s)", things.len());
    things
}

/// Lifetime of one thing. Returns the operations it left pending.
async fn run_thing(
    id: String,
    settings: Arc<Settings>,
    behavior: Arc<ThingBehavior>,
    sink: ChannelSink,
    stop: watch::Receiver<bool>,
) -> usize {
    let session = Arc::new(RumqttSession::new(id.clone(), settings.broker.clone()));
    let client = LoadClient::new(id, session, Arc::new(sink), &settings.reconnect);

    if settings.tls.enabled && !client.configure_tls(&settings.tls) {
        return 0;
    }
    if !client.connect(&settings.broker.host, settings.broker.port) {
        return 0;
    }
    let sweeper = client.spawn_sweeper(Duration::from_millis(settings.tracker.sweep_interval_ms));

    behavior.run(&client, stop).await;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    client.finish()
}
