//! Extension connection tracker.
//!
//! Owns the question "is the extension installed, and which version?".
//! The answer starts UNKNOWN and is settled by the first
//! `extension_version_response`; it is never unset for the rest of the
//! session (there is no uninstall path short of a full reload).
//!
//! Probe schedule: one startup grace delay, then fast resends while the
//! extension is most likely mid-injection, then an indefinite slow
//! cadence. The first response cancels all probing permanently.

use crate::core::bus::ExtensionBus;
use crate::core::client::AppEvent;
use crate::core::config::{
    VERSION_FAST_POLL_INTERVAL, VERSION_FAST_POLL_WINDOW, VERSION_SLOW_POLL_INTERVAL,
    VERSION_STARTUP_DELAY,
};
use crate::core::messages::OutboundMessage;
use crate::utils::sos::SignalOfStop;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, info};

/// Liveness/version snapshot. `installed` flips to true at most once per
/// session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionState {
    pub installed: bool,
    pub version: Option<String>,
}

/// Handle over the tracker's shared state and its polling task.
#[derive(Clone)]
pub struct ConnectionTracker {
    state: Arc<RwLock<ConnectionState>>,
    sos: SignalOfStop,
}

impl ConnectionTracker {
    /// Spawn the polling task. `version_rx` is the tracker's demux route
    /// from the bus dispatch.
    pub fn spawn(
        bus: ExtensionBus,
        version_rx: mpsc::UnboundedReceiver<String>,
        event_tx: mpsc::UnboundedSender<AppEvent>,
        parent: &SignalOfStop,
    ) -> Self {
        let state = Arc::new(RwLock::new(ConnectionState::default()));
        let sos = parent.linked();

        let task_state = state.clone();
        let task_sos = sos.clone();
        tokio::spawn(async move {
            poll_loop(bus, version_rx, task_state, event_tx, task_sos).await;
        });

        Self { state, sos }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.read().unwrap().clone()
    }

    /// Tear down all outstanding probe timers. Idempotent.
    pub fn dispose(&self) {
        self.sos.cancel();
    }
}

async fn poll_loop(
    bus: ExtensionBus,
    mut version_rx: mpsc::UnboundedReceiver<String>,
    state: Arc<RwLock<ConnectionState>>,
    event_tx: mpsc::UnboundedSender<AppEvent>,
    sos: SignalOfStop,
) {
    // Injection grace before the first probe.
    tokio::select! {
        _ = sos.wait() => return,
        _ = sleep(VERSION_STARTUP_DELAY) => {}
    }

    bus.send(&OutboundMessage::FetchVersion);
    let fast_deadline = Instant::now() + VERSION_FAST_POLL_WINDOW;
    let mut ticker = interval_at(
        Instant::now() + VERSION_FAST_POLL_INTERVAL,
        VERSION_FAST_POLL_INTERVAL,
    );

    let version = loop {
        tokio::select! {
            _ = sos.wait() => return,
            received = version_rx.recv() => match received {
                Some(version) => break version,
                None => return,
            },
            tick = ticker.tick() => {
                bus.send(&OutboundMessage::FetchVersion);
                if tick >= fast_deadline {
                    // Fast window exhausted; fall back to the slow cadence.
                    debug!(event = "version_poll_slow_phase", "No version reply yet, slowing probe cadence");
                    ticker = interval_at(tick + VERSION_SLOW_POLL_INTERVAL, VERSION_SLOW_POLL_INTERVAL);
                }
            }
        }
    };

    {
        let mut s = state.write().unwrap();
        s.installed = true;
        s.version = Some(version.clone());
    }
    info!(event = "extension_connected", version = %version, "Extension detected, probing stopped");
    let _ = event_tx.send(AppEvent::ExtensionConnected { version });

    // Probing is over for good. Stay alive only to absorb duplicate
    // responses as no-ops until teardown.
    loop {
        tokio::select! {
            _ = sos.wait() => return,
            received = version_rx.recv() => match received {
                Some(dup) => {
                    debug!(event = "version_response_duplicate", version = %dup, "Already connected; ignoring");
                }
                None => return,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bus::{BusEndpoint, DispatchRoutes, ExtensionBus};
    use crate::core::messages::InboundMessage;
    use std::time::Duration;

    const ORIGIN: &str = "https://app.payproof.test";

    struct Fixture {
        endpoint: BusEndpoint,
        tracker: ConnectionTracker,
        events: mpsc::UnboundedReceiver<AppEvent>,
        sos: SignalOfStop,
    }

    fn fixture() -> Fixture {
        let (version_tx, version_rx) = mpsc::unbounded_channel();
        let (metadata_tx, _metadata_rx) = mpsc::unbounded_channel();
        let (proof_tx, _proof_rx) = mpsc::unbounded_channel();
        let sos = SignalOfStop::new();
        let (bus, endpoint, _dispatch) = ExtensionBus::open(
            ORIGIN,
            DispatchRoutes { version_tx, metadata_tx, proof_tx },
            sos.clone(),
        );
        let (event_tx, events) = mpsc::unbounded_channel();
        let tracker = ConnectionTracker::spawn(bus, version_rx, event_tx, &sos);
        Fixture { endpoint, tracker, events, sos }
    }

    fn count_version_probes(endpoint: &mut BusEndpoint) -> usize {
        endpoint
            .drain_commands()
            .into_iter()
            .filter(|c| matches!(c, OutboundMessage::FetchVersion))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn response_during_fast_poll_connects_and_stops_probing() {
        let mut fx = fixture();

        // t = 700 ms: one probe (t=300) has gone out; answer it.
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(count_version_probes(&mut fx.endpoint), 1);
        fx.endpoint.push(&InboundMessage::VersionResponse { version: "1.2.3".into() });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let state = fx.tracker.state();
        assert!(state.installed);
        assert_eq!(state.version.as_deref(), Some("1.2.3"));
        assert!(matches!(
            fx.events.try_recv(),
            Ok(AppEvent::ExtensionConnected { .. })
        ));

        // Well past both cadences: not a single further probe.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count_version_probes(&mut fx.endpoint), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_cadence_is_fast_then_slow() {
        let mut fx = fixture();

        // Fast phase: probes at 300, 800, 1300, 1800, 2300 ms.
        tokio::time::sleep(Duration::from_millis(2400)).await;
        assert_eq!(count_version_probes(&mut fx.endpoint), 5);

        // Slow phase: next probes at 7300 and 12300 ms.
        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert_eq!(count_version_probes(&mut fx.endpoint), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_response_is_a_no_op() {
        let mut fx = fixture();

        tokio::time::sleep(Duration::from_millis(400)).await;
        fx.endpoint.push(&InboundMessage::VersionResponse { version: "1.0.0".into() });
        tokio::time::sleep(Duration::from_millis(50)).await;
        fx.endpoint.push(&InboundMessage::VersionResponse { version: "2.0.0".into() });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let state = fx.tracker.state();
        assert!(state.installed);
        assert_eq!(state.version.as_deref(), Some("1.0.0"));
        // Exactly one connected event.
        assert!(fx.events.try_recv().is_ok());
        assert!(fx.events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_cancels_outstanding_timers() {
        let mut fx = fixture();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(count_version_probes(&mut fx.endpoint), 1);

        fx.tracker.dispose();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count_version_probes(&mut fx.endpoint), 0);
        assert!(!fx.tracker.state().installed);
        drop(fx.sos);
    }
}
