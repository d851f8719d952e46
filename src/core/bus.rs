//! Extension transport: same-origin message bus endpoint and dispatch.
//!
//! `ExtensionBus` is the only thing that talks to the bus. Outbound
//! commands are serialized and posted fire-and-forget; the dispatch task
//! owns the inbound subscription for its whole lifetime and demultiplexes
//! parsed events to the component that owns each kind. Silence is not an
//! error here; owners apply their own timeouts.
//!
//! Origin rule: an inbound envelope is dropped before parsing unless its
//! origin equals the client's own origin. Nothing downstream ever sees a
//! foreign-origin payload.

use crate::core::messages::{parse_inbound, InboundMessage, NotaryRequest, OutboundMessage, PaymentCandidate};
use crate::utils::sos::SignalOfStop;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// ── Envelope ─────────────────────────────────────────────────────────────────

/// A raw bus frame: payload plus the origin the bus attached to it.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub origin: String,
    pub payload: Value,
}

// ── Demux targets ────────────────────────────────────────────────────────────

/// Metadata replacement pushed by the extension.
#[derive(Debug, Clone)]
pub struct MetadataUpdate {
    pub platform: String,
    pub entries: Vec<PaymentCandidate>,
    pub expires_at: u64,
}

/// Proof-related events, owned by the orchestrator.
#[derive(Debug, Clone)]
pub enum ProofEvent {
    /// `fetch_proof_request_id_response`; `None` means the extension has
    /// not registered the request.
    IdAssigned(Option<String>),
    /// `fetch_proof_by_id_response` body.
    Notary(NotaryRequest),
}

/// Per-kind inbound routes. Each receiver side lives in the component that
/// owns the corresponding state.
pub struct DispatchRoutes {
    pub version_tx: mpsc::UnboundedSender<String>,
    pub metadata_tx: mpsc::UnboundedSender<MetadataUpdate>,
    pub proof_tx: mpsc::UnboundedSender<ProofEvent>,
}

// ── Bus ──────────────────────────────────────────────────────────────────────

/// Outbound half of the bus. Cheap to clone; all clones share the channel.
#[derive(Clone)]
pub struct ExtensionBus {
    origin: String,
    outbound_tx: mpsc::UnboundedSender<Value>,
}

impl ExtensionBus {
    /// Open the bus: wires both directions and spawns the dispatch task.
    /// Returns the client-side bus and the opposite endpoint (handed to
    /// the real extension bridge, or to a harness/test double).
    pub fn open(
        origin: impl Into<String>,
        routes: DispatchRoutes,
        sos: SignalOfStop,
    ) -> (Self, BusEndpoint, JoinHandle<()>) {
        let origin = origin.into();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let dispatch = spawn_dispatch(origin.clone(), inbound_rx, routes, sos);

        let bus = Self { origin: origin.clone(), outbound_tx };
        let endpoint = BusEndpoint { origin, commands: outbound_rx, events_tx: inbound_tx };
        (bus, endpoint, dispatch)
    }

    /// Post a command. No acknowledgement; a missing receiver (extension
    /// absent) is not an error.
    pub fn send(&self, message: &OutboundMessage) {
        let payload = match serde_json::to_value(message) {
            Ok(v) => v,
            Err(e) => {
                warn!(event = "bus_send_encode_failure", error = %e, "Failed to encode command");
                return;
            }
        };
        debug!(event = "bus_send", command = ?message, "Posting command to extension bus");
        let _ = self.outbound_tx.send(payload);
    }
}

/// Extension-side endpoint: receives the client's commands and pushes
/// events back. Real deployments bridge this to the page bus; the demo
/// harness and tests drive it directly.
pub struct BusEndpoint {
    origin: String,
    pub commands: mpsc::UnboundedReceiver<Value>,
    events_tx: mpsc::UnboundedSender<Envelope>,
}

/// Cheap clone of the endpoint's event side, for replies scheduled off the
/// command loop.
#[derive(Clone)]
pub struct EventPusher {
    origin: String,
    events_tx: mpsc::UnboundedSender<Envelope>,
}

impl EventPusher {
    /// Push an event with the page's own origin (the well-behaved case).
    pub fn push(&self, message: &InboundMessage) {
        match serde_json::to_value(message) {
            Ok(payload) => {
                let _ = self.events_tx.send(Envelope { origin: self.origin.clone(), payload });
            }
            Err(e) => warn!(event = "bus_push_encode_failure", error = %e, "Failed to encode event"),
        }
    }
}

impl BusEndpoint {
    pub fn pusher(&self) -> EventPusher {
        EventPusher { origin: self.origin.clone(), events_tx: self.events_tx.clone() }
    }

    /// Push an event with the page's own origin (the well-behaved case).
    pub fn push(&self, message: &InboundMessage) {
        self.pusher().push(message);
    }

    /// Push a raw envelope with an arbitrary origin. Exists so tests can
    /// exercise the origin filter; the filter, not the pusher, is trusted.
    pub fn push_raw(&self, origin: &str, payload: Value) {
        let _ = self.events_tx.send(Envelope { origin: origin.to_string(), payload });
    }

    /// Receive the next command, parsed back into its typed form.
    pub async fn next_command(&mut self) -> Option<OutboundMessage> {
        loop {
            let payload = self.commands.recv().await?;
            match serde_json::from_value::<OutboundMessage>(payload) {
                Ok(cmd) => return Some(cmd),
                Err(e) => {
                    warn!(event = "endpoint_decode_failure", error = %e, "Undecodable command");
                }
            }
        }
    }

    /// Drain commands already queued, without waiting.
    pub fn drain_commands(&mut self) -> Vec<OutboundMessage> {
        let mut out = Vec::new();
        while let Ok(payload) = self.commands.try_recv() {
            if let Ok(cmd) = serde_json::from_value::<OutboundMessage>(payload) {
                out.push(cmd);
            }
        }
        out
    }
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

fn spawn_dispatch(
    origin: String,
    mut inbound_rx: mpsc::UnboundedReceiver<Envelope>,
    routes: DispatchRoutes,
    sos: SignalOfStop,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let envelope = tokio::select! {
                _ = sos.wait() => break,
                received = inbound_rx.recv() => match received {
                    Some(envelope) => envelope,
                    None => break,
                },
            };

            if envelope.origin != origin {
                debug!(
                    event = "bus_origin_rejected",
                    origin = %envelope.origin,
                    "Dropping envelope from foreign origin"
                );
                continue;
            }

            let message = match parse_inbound(&envelope.payload) {
                Some(m) => m,
                None => continue,
            };
            debug!(event = "bus_receive", message = ?message, "Extension event received");

            // A closed route means its owner was disposed; late events for
            // it are dropped, which is the behaviour owners rely on.
            match message {
                InboundMessage::VersionResponse { version } => {
                    let _ = routes.version_tx.send(version);
                }
                InboundMessage::MetadataResponse { platform, metadata, expires_at } => {
                    let _ = routes.metadata_tx.send(MetadataUpdate {
                        platform,
                        entries: metadata,
                        expires_at,
                    });
                }
                InboundMessage::ProofIdResponse { proof_id } => {
                    let _ = routes.proof_tx.send(ProofEvent::IdAssigned(proof_id));
                }
                InboundMessage::ProofByIdResponse { request_history } => {
                    let _ = routes.proof_tx.send(ProofEvent::Notary(request_history.notary_request));
                }
            }
        }
        debug!(event = "bus_dispatch_stopped", "Dispatch loop terminated");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ORIGIN: &str = "https://app.payproof.test";

    fn routed_bus() -> (
        ExtensionBus,
        BusEndpoint,
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedReceiver<MetadataUpdate>,
        mpsc::UnboundedReceiver<ProofEvent>,
        SignalOfStop,
    ) {
        let (version_tx, version_rx) = mpsc::unbounded_channel();
        let (metadata_tx, metadata_rx) = mpsc::unbounded_channel();
        let (proof_tx, proof_rx) = mpsc::unbounded_channel();
        let sos = SignalOfStop::new();
        let (bus, endpoint, _task) = ExtensionBus::open(
            ORIGIN,
            DispatchRoutes { version_tx, metadata_tx, proof_tx },
            sos.clone(),
        );
        (bus, endpoint, version_rx, metadata_rx, proof_rx, sos)
    }

    #[tokio::test]
    async fn routes_version_response_to_owner() {
        let (_bus, endpoint, mut version_rx, _m, _p, _sos) = routed_bus();
        endpoint.push(&InboundMessage::VersionResponse { version: "1.2.3".into() });
        assert_eq!(version_rx.recv().await.unwrap(), "1.2.3");
    }

    #[tokio::test]
    async fn foreign_origins_change_nothing() {
        let (_bus, endpoint, mut version_rx, mut metadata_rx, mut proof_rx, _sos) = routed_bus();

        // A spread of near-miss origins: scheme, host case, subdomain, port.
        for origin in [
            "https://evil.test",
            "http://app.payproof.test",
            "https://APP.payproof.test",
            "https://sub.app.payproof.test",
            "https://app.payproof.test:8443",
            "",
        ] {
            endpoint.push_raw(
                origin,
                json!({ "type": "extension_version_response", "version": "6.6.6" }),
            );
            endpoint.push_raw(
                origin,
                json!({
                    "type": "metadata_messages_response",
                    "platform": "venmo", "metadata": [], "expiresAt": 1u64,
                }),
            );
        }
        // Same-origin sentinel proves the rejected frames were not queued.
        endpoint.push(&InboundMessage::VersionResponse { version: "1.0.0".into() });

        assert_eq!(version_rx.recv().await.unwrap(), "1.0.0");
        assert!(metadata_rx.try_recv().is_err());
        assert!(proof_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_types_are_ignored() {
        let (_bus, endpoint, mut version_rx, _m, _p, _sos) = routed_bus();
        endpoint.push_raw(ORIGIN, json!({ "type": "hologram_response", "beam": true }));
        endpoint.push(&InboundMessage::VersionResponse { version: "2.0.0".into() });
        assert_eq!(version_rx.recv().await.unwrap(), "2.0.0");
    }

    #[tokio::test]
    async fn commands_round_trip_through_the_wire_shape() {
        let (bus, mut endpoint, _v, _m, _p, _sos) = routed_bus();
        bus.send(&OutboundMessage::FetchProofById { proof_id: "p-7".into() });
        match endpoint.next_command().await.unwrap() {
            OutboundMessage::FetchProofById { proof_id } => assert_eq!(proof_id, "p-7"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispose_stops_dispatch() {
        let (_bus, endpoint, mut version_rx, _m, _p, sos) = routed_bus();
        sos.cancel();
        tokio::task::yield_now().await;
        endpoint.push(&InboundMessage::VersionResponse { version: "9.9.9".into() });
        // Dispatch is gone; the event is never routed.
        tokio::task::yield_now().await;
        assert!(version_rx.try_recv().is_err());
    }
}
