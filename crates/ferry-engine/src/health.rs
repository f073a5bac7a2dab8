//! Worker health gate.
//!
//! Before the first poll the engine verifies the worker is reachable, so a
//! queue full of messages is not drained into a dead endpoint. The gate
//! probes the health URL at a fixed interval until it answers or the wait
//! budget elapses. A positive verdict is cached for the engine's lifetime;
//! health is assumed stable once established and is never re-checked.

use std::{sync::Arc, time::Duration};

use ferry_core::Clock;
use tracing::{debug, info, warn};

use crate::client::WorkerClient;

/// Interval between health probes.
const PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Cached outcome of the health gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    /// No check has completed yet.
    Unchecked,
    /// The worker answered a probe; cached for the engine's lifetime.
    Healthy,
    /// The wait budget elapsed without a successful probe.
    Unhealthy,
}

/// Verifies the downstream worker is reachable before the loop starts.
pub struct HealthGate {
    client: WorkerClient,
    url: Option<String>,
    wait_budget: Duration,
    verdict: HealthVerdict,
    clock: Arc<dyn Clock>,
}

impl HealthGate {
    /// Creates a gate for the given health URL and wait budget.
    ///
    /// With no URL configured the gate reports healthy without any network
    /// traffic.
    pub fn new(
        client: WorkerClient,
        url: Option<String>,
        wait_budget: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            url,
            wait_budget,
            verdict: HealthVerdict::Unchecked,
            clock,
        }
    }

    /// Checks worker health, probing until success or deadline.
    ///
    /// Only a positive verdict is cached: a previous failure does not stop
    /// a later call from probing again.
    pub async fn check(&mut self) -> bool {
        if self.verdict == HealthVerdict::Healthy {
            return true;
        }

        let Some(url) = self.url.clone() else {
            self.verdict = HealthVerdict::Healthy;
            return true;
        };

        debug!(%url, wait_budget_ms = self.wait_budget.as_millis() as u64, "checking worker health");
        let deadline = self.clock.now() + self.wait_budget;

        loop {
            if self.client.probe(&url).await {
                info!(%url, "worker is healthy");
                self.verdict = HealthVerdict::Healthy;
                return true;
            }

            if self.clock.now() >= deadline {
                warn!(%url, "worker did not become healthy within the wait budget");
                self.verdict = HealthVerdict::Unhealthy;
                return false;
            }

            self.clock.sleep(PROBE_INTERVAL).await;
        }
    }

    /// The current cached verdict.
    pub fn verdict(&self) -> HealthVerdict {
        self.verdict
    }
}

#[cfg(test)]
mod tests {
    use ferry_core::RealClock;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::client::ClientConfig;

    fn gate(url: Option<String>, wait_budget: Duration) -> HealthGate {
        let client = WorkerClient::new(ClientConfig::default()).unwrap();
        HealthGate::new(client, url, wait_budget, Arc::new(RealClock::new()))
    }

    #[tokio::test]
    async fn no_url_is_healthy_without_probing() {
        let mut gate = gate(None, Duration::from_secs(5));

        assert!(gate.check().await);
        assert_eq!(gate.verdict(), HealthVerdict::Healthy);
    }

    #[tokio::test]
    async fn healthy_endpoint_passes_on_first_probe() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut gate = gate(
            Some(format!("{}/health", server.uri())),
            Duration::from_secs(5),
        );

        assert!(gate.check().await);
        assert_eq!(gate.verdict(), HealthVerdict::Healthy);
    }

    #[tokio::test]
    async fn positive_verdict_is_cached() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut gate = gate(Some(server.uri()), Duration::from_secs(5));

        assert!(gate.check().await);
        // Second call must not touch the network; the mock expects one hit.
        assert!(gate.check().await);
    }

    #[tokio::test]
    async fn error_status_is_not_healthy() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let clock = Arc::new(ferry_testing::TestClock::new());
        let client = WorkerClient::new(ClientConfig::default()).unwrap();
        let mut gate = HealthGate::new(
            client,
            Some(server.uri()),
            Duration::from_millis(5000),
            clock.clone(),
        );

        assert!(!gate.check().await);
        assert_eq!(gate.verdict(), HealthVerdict::Unhealthy);
        // Probed once per second across the five-second budget.
        assert!(clock.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn negative_verdict_is_probed_again() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let clock = Arc::new(ferry_testing::TestClock::new());
        let client = WorkerClient::new(ClientConfig::default()).unwrap();
        let mut gate = HealthGate::new(
            client,
            Some(server.uri()),
            Duration::ZERO,
            clock,
        );

        assert!(!gate.check().await);

        // Swap in a healthy endpoint; the gate should try again.
        server.reset().await;
        Mock::given(matchers::method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        assert!(gate.check().await);
        assert_eq!(gate.verdict(), HealthVerdict::Healthy);
    }
}
