//! Connectivity detection by polling the collection service.

use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use submission_outbox::NetworkMonitor;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Considers the service reachable when `GET {endpoint}/health` gets any
/// HTTP response. Starts offline until the first probe completes.
pub struct ProbeNetworkMonitor {
    state: watch::Sender<bool>,
    client: Client,
    health_url: Url,
    interval: Duration,
}

impl ProbeNetworkMonitor {
    pub fn new(endpoint: &Url, interval: Duration) -> Result<Self, Box<dyn std::error::Error>> {
        if interval.is_zero() {
            return Err("probe interval must be non-zero".into());
        }
        let health_url = health_url(endpoint).ok_or("endpoint cannot be a base URL")?;
        let client = Client::builder().timeout(PROBE_TIMEOUT).build()?;
        let (state, _) = watch::channel(false);
        Ok(Self {
            state,
            client,
            health_url,
            interval,
        })
    }

    /// Probe once and publish the result. Returns the new connectivity state.
    pub async fn probe_once(&self) -> bool {
        let online = match self.client.get(self.health_url.clone()).send().await {
            Ok(response) => {
                debug!(status = %response.status(), "Connectivity probe answered");
                true
            }
            Err(e) => {
                debug!(error = %e, "Connectivity probe failed");
                false
            }
        };
        self.set_online(online);
        online
    }

    /// Probe on a fixed interval until the task is aborted.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.interval);
            loop {
                ticker.tick().await;
                monitor.probe_once().await;
            }
        })
    }

    fn set_online(&self, online: bool) {
        let changed = self.state.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
        if changed {
            info!(online, "Connectivity changed");
        }
    }
}

impl NetworkMonitor for ProbeNetworkMonitor {
    fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

fn health_url(endpoint: &Url) -> Option<Url> {
    let mut url = endpoint.clone();
    url.path_segments_mut().ok()?.pop_if_empty().push("health");
    Some(url)
}
