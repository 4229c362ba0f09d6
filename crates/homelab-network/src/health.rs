//! Readiness checks for local daemons

use async_trait::async_trait;
use homelab_core::{LabError, LabResult};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Something that can report whether a service is accepting requests
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Single readiness check; never fails, unreachable means not ready
    async fn check(&self) -> bool;

    /// Human readable target, used in logs
    fn target(&self) -> String;
}

/// HTTP GET probe
pub struct HttpProbe {
    /// HTTP client for probes
    client: reqwest::Client,
    /// Full URL to request
    url: String,
    /// Substring the body must contain, if any
    body_marker: Option<String>,
    /// Per-request timeout
    timeout: Duration,
}

impl HttpProbe {
    /// Create a new probe
    pub fn new(url: impl Into<String>, timeout: Duration) -> LabResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LabError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            body_marker: None,
            timeout,
        })
    }

    /// Probe for Ollama's model listing endpoint under `base_url`
    pub fn ollama_tags(base_url: &str, timeout: Duration) -> LabResult<Self> {
        let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
        Ok(Self::new(url, timeout)?.with_body_marker("models"))
    }

    /// Require the response body to contain `marker`
    pub fn with_body_marker(mut self, marker: impl Into<String>) -> Self {
        self.body_marker = Some(marker.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the timeout duration
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl ReadinessProbe for HttpProbe {
    async fn check(&self) -> bool {
        let response = match self.client.get(&self.url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(endpoint = %self.url, error = %e, "Readiness probe error");
                return false;
            }
        };

        if !response.status().is_success() {
            debug!(endpoint = %self.url, status = %response.status(), "Readiness probe rejected");
            return false;
        }

        match &self.body_marker {
            None => true,
            Some(marker) => match response.text().await {
                Ok(body) => body.contains(marker.as_str()),
                Err(e) => {
                    debug!(endpoint = %self.url, error = %e, "Failed to read probe body");
                    false
                }
            },
        }
    }

    fn target(&self) -> String {
        self.url.clone()
    }
}

/// Probe with a fixed answer, used for dry runs
pub struct StaticProbe(pub bool);

#[async_trait]
impl ReadinessProbe for StaticProbe {
    async fn check(&self) -> bool {
        self.0
    }

    fn target(&self) -> String {
        "static".to_string()
    }
}

/// Bounded fixed-interval polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval: Duration::from_secs(1),
        }
    }
}

/// Poll `probe` until it reports ready or the attempts run out.
///
/// Returns whether readiness was observed. Running out of attempts is not an
/// error; callers decide how to proceed.
pub async fn wait_until_ready(probe: &dyn ReadinessProbe, policy: &PollPolicy) -> bool {
    for attempt in 1..=policy.attempts {
        if probe.check().await {
            info!(target_url = %probe.target(), attempt, "Endpoint ready");
            return true;
        }
        debug!(target_url = %probe.target(), attempt, "Endpoint not ready yet");
        if attempt < policy.attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    warn!(
        target_url = %probe.target(),
        attempts = policy.attempts,
        "Endpoint did not become ready; continuing"
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingProbe {
        ready_after: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ReadinessProbe for CountingProbe {
        async fn check(&self) -> bool {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            n >= self.ready_after
        }

        fn target(&self) -> String {
            "counting".to_string()
        }
    }

    fn fast(attempts: u32) -> PollPolicy {
        PollPolicy {
            attempts,
            interval: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_probe_creation() {
        let probe =
            HttpProbe::ollama_tags("http://localhost:11434/", Duration::from_secs(2)).unwrap();
        assert_eq!(probe.url(), "http://localhost:11434/api/tags");
        assert_eq!(probe.timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_default_policy() {
        let policy = PollPolicy::default();
        assert_eq!(policy.attempts, 30);
        assert_eq!(policy.interval, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_wait_stops_at_first_ready() {
        let probe = CountingProbe {
            ready_after: 3,
            calls: AtomicU32::new(0),
        };
        assert!(wait_until_ready(&probe, &fast(10)).await);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_gives_up_without_error() {
        let probe = CountingProbe {
            ready_after: u32::MAX,
            calls: AtomicU32::new(0),
        };
        assert!(!wait_until_ready(&probe, &fast(5)).await);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_static_probe() {
        assert!(wait_until_ready(&StaticProbe(true), &fast(1)).await);
        assert!(!StaticProbe(false).check().await);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_not_ready() {
        // Port 9 (discard) is not expected to run an HTTP server
        let probe =
            HttpProbe::new("http://127.0.0.1:9/api/tags", Duration::from_millis(500)).unwrap();
        assert!(!probe.check().await);
    }
}
