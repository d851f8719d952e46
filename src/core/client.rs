//! Client context: one object owning the bus and every component on it.
//!
//! Nothing here is ambient: the bus, tracker, cache, and orchestrator are
//! constructed together, share one lifecycle, and are torn down by a
//! single `dispose()`. Tests swap the extension side by driving the
//! returned [`BusEndpoint`] directly.

use crate::core::bus::{BusEndpoint, DispatchRoutes, ExtensionBus};
use crate::core::connection::ConnectionTracker;
use crate::core::messages::OutboundMessage;
use crate::core::metadata::MetadataCache;
use crate::core::orchestrator::ProofOrchestrator;
use crate::core::reporting::ReportSink;
use crate::utils::sos::SignalOfStop;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Events surfaced to the UI layer.
#[derive(Debug, Clone)]
pub enum AppEvent {
    ExtensionConnected { version: String },
    MetadataUpdated { platform: String, count: usize },
    MetadataExpired { platform: String },
    /// The extension registered the current proof request.
    ProofIdAssigned { request_id: Uuid },
    /// The extension replied with a null proof id for the current request.
    ProofIdMissing { request_id: Uuid },
    ProofCompleted { request_id: Uuid },
    ProofFailed { request_id: Uuid, reason: String },
}

/// Owns the extension-facing half of the application.
pub struct ExtensionClient {
    sos: SignalOfStop,
    bus: ExtensionBus,
    connection: ConnectionTracker,
    metadata: MetadataCache,
    orchestrator: ProofOrchestrator,
}

impl ExtensionClient {
    /// Wire the bus, spawn all component tasks, and hand back the
    /// extension-side endpoint (bridged to the real bus in production,
    /// driven by the harness in the demo and tests).
    pub fn new(
        origin: impl Into<String>,
        reporter: Arc<dyn ReportSink>,
        event_tx: mpsc::UnboundedSender<AppEvent>,
        parent: &SignalOfStop,
    ) -> (Self, BusEndpoint) {
        let sos = parent.linked();

        let (version_tx, version_rx) = mpsc::unbounded_channel();
        let (metadata_tx, metadata_rx) = mpsc::unbounded_channel();
        let (proof_tx, proof_rx) = mpsc::unbounded_channel();

        let (bus, endpoint, _dispatch) = ExtensionBus::open(
            origin,
            DispatchRoutes { version_tx, metadata_tx, proof_tx },
            sos.clone(),
        );

        let connection =
            ConnectionTracker::spawn(bus.clone(), version_rx, event_tx.clone(), &sos);
        let metadata = MetadataCache::spawn(bus.clone(), metadata_rx, event_tx.clone(), &sos);
        let orchestrator =
            ProofOrchestrator::spawn(bus.clone(), proof_rx, event_tx, reporter, &sos);

        (Self { sos, bus, connection, metadata, orchestrator }, endpoint)
    }

    pub fn connection(&self) -> &ConnectionTracker {
        &self.connection
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    pub fn orchestrator(&self) -> &ProofOrchestrator {
        &self.orchestrator
    }

    /// Ask the extension to open its sidebar on a route.
    pub fn open_sidebar(&self, route: &str) {
        self.bus.send(&OutboundMessage::OpenSidebar { route: route.to_string() });
    }

    /// Cancel every task and timer owned by this client. Idempotent.
    pub fn dispose(&self) {
        self.orchestrator.dispose();
        self.metadata.dispose();
        self.connection.dispose();
        self.sos.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reporting::BufferedReporter;
    use std::time::Duration;

    const ORIGIN: &str = "https://app.payproof.test";

    #[tokio::test(start_paused = true)]
    async fn open_sidebar_posts_the_command() {
        let sos = SignalOfStop::new();
        let (event_tx, _events) = mpsc::unbounded_channel();
        let (client, mut endpoint) =
            ExtensionClient::new(ORIGIN, Arc::new(BufferedReporter::new()), event_tx, &sos);

        client.open_sidebar("/settings");
        match endpoint.next_command().await.unwrap() {
            OutboundMessage::OpenSidebar { route } => assert_eq!(route, "/settings"),
            // The tracker may have probed first; accept and retry.
            OutboundMessage::FetchVersion => match endpoint.next_command().await.unwrap() {
                OutboundMessage::OpenSidebar { route } => assert_eq!(route, "/settings"),
                other => panic!("unexpected command: {other:?}"),
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_silences_every_component() {
        let sos = SignalOfStop::new();
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let (client, mut endpoint) =
            ExtensionClient::new(ORIGIN, Arc::new(BufferedReporter::new()), event_tx, &sos);

        client.dispose();
        tokio::time::sleep(Duration::from_secs(30)).await;

        // No probes, no ticks, no events after teardown.
        assert!(endpoint.drain_commands().is_empty());
        assert!(events.try_recv().is_err());
        // The app-level signal is untouched.
        assert!(!sos.cancelled());
    }
}
