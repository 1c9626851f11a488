//! Builds the outbox components from configuration.

use super::probe::ProbeNetworkMonitor;
use outbox_config_and_utils::{Config, Paths};
use outbox_storage::{SqliteStorage, StorageError};
use std::sync::Arc;
use std::time::Duration;
use submission_outbox::{
    Dispatcher, DispatcherConfig, HttpTransport, HttpTransportConfig, QueueStore, RetryPolicy,
    SubmissionOutbox, SystemClock,
};
use tracing::{info, warn};

/// Bearer token for the collection service, if it requires one.
const AUTH_TOKEN_ENV: &str = "FIELD_OUTBOX_TOKEN";

pub fn retry_policy(config: &Config) -> RetryPolicy {
    RetryPolicy {
        base: Duration::from_millis(config.backoff_base_ms),
        cap: Duration::from_millis(config.backoff_max_ms),
        jitter_max: Duration::from_millis(config.jitter_max_ms),
        max_attempts: config.max_attempts,
    }
}

pub fn dispatcher_config(config: &Config) -> DispatcherConfig {
    DispatcherConfig {
        max_in_flight: config.max_in_flight,
        send_timeout: config.send_timeout(),
        poll_interval: config.poll_interval(),
    }
}

pub fn transport_config(
    config: &Config,
    auth_token: Option<String>,
) -> Result<HttpTransportConfig, Box<dyn std::error::Error>> {
    let mut transport = HttpTransportConfig::new(config.endpoint_url()?);
    transport.auth_token = auth_token.filter(|token| !token.is_empty());
    Ok(transport)
}

/// Open the queue database under the base directory.
///
/// Only one process may hold the queue, so this fails while `run` is active.
pub fn open_store(paths: &Paths) -> Result<Arc<QueueStore>, Box<dyn std::error::Error>> {
    let storage = SqliteStorage::open(paths.database_file()).map_err(|e| match e {
        StorageError::Locked { .. } => format!(
            "{e}; stop `field-outbox run` before changing the queue from another process"
        )
        .into(),
        other => Box::new(other) as Box<dyn std::error::Error>,
    })?;
    let store = QueueStore::open(Arc::new(storage), Arc::new(SystemClock));
    if store.is_degraded() {
        warn!(
            path = %paths.database_file().display(),
            "Queue storage is degraded; changes are held in memory only"
        );
    }
    Ok(Arc::new(store))
}

/// Everything needed to deliver submissions.
pub struct OutboxApp {
    pub outbox: SubmissionOutbox,
    pub dispatcher: Dispatcher,
    pub network: Arc<ProbeNetworkMonitor>,
}

impl OutboxApp {
    pub fn build(config: &Config, paths: &Paths) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;
        let store = open_store(paths)?;

        let transport = HttpTransport::new(transport_config(
            config,
            std::env::var(AUTH_TOKEN_ENV).ok(),
        )?)?;
        let network = Arc::new(ProbeNetworkMonitor::new(
            &config.endpoint_url()?,
            config.probe_interval(),
        )?);

        let dispatcher = Dispatcher::new(
            store.clone(),
            Arc::new(transport),
            network.clone(),
            Arc::new(SystemClock),
            retry_policy(config),
            dispatcher_config(config),
        );
        let outbox = SubmissionOutbox::new(store).with_waker(dispatcher.waker());

        info!(
            endpoint = %config.endpoint,
            max_in_flight = config.max_in_flight,
            max_attempts = config.max_attempts,
            "Outbox initialized"
        );

        Ok(Self {
            outbox,
            dispatcher,
            network,
        })
    }
}
