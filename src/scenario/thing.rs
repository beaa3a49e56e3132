use std::time::Duration;

use rumqttc::QoS;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::client::LoadClient;
use crate::config::Settings;
use crate::tracker::{PublishOptions, SubscribeOptions};
use crate::utils::LoadError;

/// Placeholder replaced with the thing's client id in topic templates.
pub const THING_PLACEHOLDER: &str = "{thing}";

pub fn expand_topic(template: &str, thing_id: &str) -> String {
    template.replace(THING_PLACEHOLDER, thing_id)
}

pub fn qos_from_level(level: u8) -> Result<QoS, LoadError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(LoadError::InvalidSetting(format!("qos must be 0, 1 or 2, got {other}"))),
    }
}

/// `publish:qos0:things/{thing}/telemetry`. Labels use the topic template so
/// every thing reports into the same row.
pub fn publish_label(qos: QoS, topic: &str) -> String {
    format!("publish:qos{}:{}", qos as u8, topic)
}

pub fn subscribe_label(qos: QoS, topic: &str) -> String {
    format!("subscribe:qos{}:{}", qos as u8, topic)
}

#[derive(Debug, Clone)]
pub struct ThingBehavior {
    pub topic: String,
    pub subscribe_topic: Option<String>,
    pub qos: QoS,
    pub payload: String,
    pub publish_timeout_ms: u64,
    pub subscribe_timeout_ms: u64,
    pub on_start_delay: Duration,
    pub wait_time: Duration,
}

impl ThingBehavior {
    pub fn from_settings(settings: &Settings) -> Result<Self, LoadError> {
        let load = &settings.load;
        if load.topic.is_empty() {
            return Err(LoadError::InvalidSetting("load.topic must not be empty".to_string()));
        }
        Ok(Self {
            topic: load.topic.clone(),
            subscribe_topic: load.subscribe_topic.clone().filter(|t| !t.is_empty()),
            qos: qos_from_level(load.qos)?,
            payload: load.payload.clone(),
            publish_timeout_ms: settings.tracker.publish_timeout_ms,
            subscribe_timeout_ms: settings.tracker.subscribe_timeout_ms,
            on_start_delay: Duration::from_millis(load.on_start_delay_ms),
            wait_time: Duration::from_millis(load.wait_time_ms),
        })
    }

    /// Waits out the start delay, then subscribes when a subscribe topic is
    /// configured. Returns `false` when `stop` fired first.
    pub async fn on_start(&self, client: &LoadClient, stop: &mut watch::Receiver<bool>) -> bool {
        if !pause(self.on_start_delay, stop).await {
            return false;
        }
        if let Some(template) = &self.subscribe_topic {
            let topic = expand_topic(template, client.id());
            let options = SubscribeOptions::default()
                .with_qos(self.qos)
                .with_label(subscribe_label(self.qos, template))
                .with_timeout_ms(self.subscribe_timeout_ms);
            client.subscribe(&topic, options);
        }
        true
    }

    /// One iteration: publish the payload once.
    pub fn task(&self, client: &LoadClient) {
        let topic = expand_topic(&self.topic, client.id());
        let options = PublishOptions::default()
            .with_qos(self.qos)
            .with_label(publish_label(self.qos, &self.topic))
            .with_timeout_ms(self.publish_timeout_ms);
        client.publish(&topic, self.payload.as_bytes(), options);
    }

    /// Runs the behavior until `stop` flips to `true`.
    pub async fn run(&self, client: &LoadClient, mut stop: watch::Receiver<bool>) {
        if !self.on_start(client, &mut stop).await {
            debug!("{} stopped before start", client.id());
            return;
        }
        info!("{} started", client.id());

        let mut iterations: u64 = 0;
        loop {
            self.task(client);
            iterations += 1;
            if !pause(self.wait_time, &mut stop).await {
                break;
            }
        }
        debug!("{} stopped after {} iteration(s)", client.id(), iterations);
    }
}

/// Sleeps for `delay`; `false` if the run was stopped meanwhile.
async fn pause(delay: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    if *stop.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => !*stop.borrow(),
        changed = stop.changed() => changed.is_ok() && !*stop.borrow(),
    }
}
