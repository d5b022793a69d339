// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Remote render service reachability.

use std::time::Duration;
use tokio::sync::Mutex;

/// Probes the health endpoint once and remembers the answer until
/// [`reset`](Self::reset). Concurrent callers wait on the same probe.
#[derive(Debug)]
pub struct CapabilityDetector {
    client: reqwest::Client,
    health_url: String,
    timeout: Duration,
    resolved: Mutex<Option<bool>>,
}

impl CapabilityDetector {
    pub fn new(client: reqwest::Client, health_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            health_url: health_url.into(),
            timeout,
            resolved: Mutex::new(None),
        }
    }

    pub async fn is_available(&self) -> bool {
        let mut resolved = self.resolved.lock().await;
        if let Some(available) = *resolved {
            return available;
        }
        let available = self.probe().await;
        *resolved = Some(available);
        available
    }

    /// Last probe result without probing.
    pub fn cached(&self) -> Option<bool> {
        self.resolved.try_lock().ok().and_then(|guard| *guard)
    }

    pub async fn reset(&self) {
        *self.resolved.lock().await = None;
    }

    async fn probe(&self) -> bool {
        let started = std::time::Instant::now();
        let result = self
            .client
            .get(&self.health_url)
            .timeout(self.timeout)
            .send()
            .await;

        let available = match result {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::debug!(status = %resp.status(), "Health probe returned non-success");
                false
            }
            Err(e) => {
                tracing::debug!(error = %e, "Health probe failed");
                false
            }
        };

        tracing::info!(
            url = %self.health_url,
            available,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Render service probe"
        );
        available
    }
}
