use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::api::error::ApiError;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const CACHE_TTL: Duration = Duration::from_secs(5);
const CHECK_INTERVAL: Duration = Duration::from_secs(5);
pub const MAX_OFFLINE_WAIT: Duration = Duration::from_secs(300);

/// Cached reachability probe for the exchange host.
///
/// Every scan loop consults this before each request; the 5 s cache keeps
/// a fleet of loops from stampeding the probe endpoint. Any HTTP response
/// counts as reachable, only transport failures count as offline.
pub struct ConnectivityGate {
    client: reqwest::Client,
    probe_url: String,
    state: Mutex<Option<(Instant, bool)>>,
    check_interval: Duration,
}

impl ConnectivityGate {
    pub fn new(probe_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .expect("reqwest client with static config");

        Self {
            client,
            probe_url: probe_url.into(),
            state: Mutex::new(None),
            check_interval: CHECK_INTERVAL,
        }
    }

    #[cfg(test)]
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub async fn is_online(&self) -> bool {
        {
            let state = self.state.lock().unwrap();
            if let Some((checked_at, online)) = *state {
                if checked_at.elapsed() < CACHE_TTL {
                    return online;
                }
            }
        }

        let online = self.client.get(&self.probe_url).send().await.is_ok();
        *self.state.lock().unwrap() = Some((Instant::now(), online));
        online
    }

    /// Block until a probe succeeds, failing with `Timeout` once the
    /// ceiling elapses. Each poll bypasses the cache age by simple
    /// virtue of the check interval matching the TTL.
    pub async fn wait_until_online(&self, max_wait: Duration) -> Result<(), ApiError> {
        let mut waited = Duration::ZERO;

        while !self.is_online().await {
            if waited >= max_wait {
                tracing::warn!(
                    "No connectivity to {} after waiting {:?}",
                    self.probe_url,
                    max_wait
                );
                return Err(ApiError::Timeout);
            }
            tokio::time::sleep(self.check_interval).await;
            waited += self.check_interval;
        }

        Ok(())
    }

    /// Drop the cached probe result
    pub fn invalidate(&self) {
        *self.state.lock().unwrap() = None;
    }
}
