//! Proof request orchestrator.
//!
//! Drives exactly one in-flight proof generation at a time: issues
//! `generate_proof`, polls `fetch_proof_by_id` on a fixed cadence, and
//! arms an absolute timeout. Starting a new request is the only way to
//! supersede an old one, and it tears the old poll/timeout pair down
//! before arming new ones. Two live pollers could race and pin a stale
//! proof onto a new request.
//!
//! The runtime here is multi-threaded, so timer teardown alone is not
//! enough: every request carries a fresh id, and results are applied only
//! while their request is still the current one. A notary response that
//! arrives before the current request has even been assigned a proof id
//! can only belong to a superseded request and is dropped.

use crate::core::bus::{ExtensionBus, ProofEvent};
use crate::core::client::AppEvent;
use crate::core::config::{PROOF_GENERATION_TIMEOUT, PROOF_POLL_INTERVAL};
use crate::core::messages::{NotaryRequest, NotaryStatus, OutboundMessage};
use crate::core::proof::Proof;
use crate::core::reporting::ReportSink;
use crate::utils::sos::SignalOfStop;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identifies one proof attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofRequest {
    pub platform: String,
    /// Decimal-string intent hash (see `core::intent`).
    pub intent_hash: String,
    /// The extension's own index for the chosen candidate.
    pub original_index: u32,
    /// Opaque pass-through.
    pub proof_index: Option<u32>,
}

/// Outcome of the current (or most recent) attempt.
#[derive(Debug, Clone)]
pub enum ProofResult {
    Pending,
    Success(Proof),
    Error(String),
}

impl ProofResult {
    pub fn is_pending(&self) -> bool {
        matches!(self, ProofResult::Pending)
    }
}

struct ActiveRequest {
    id: Uuid,
    request: ProofRequest,
    /// Assigned by `fetch_proof_request_id_response`; polls are no-ops
    /// until it lands.
    proof_id: Option<String>,
    /// Cancels this request's poll and timeout tasks.
    sos: SignalOfStop,
}

struct Inner {
    current: Option<ActiveRequest>,
    result: ProofResult,
}

/// Owns the single in-flight request and its timers.
#[derive(Clone)]
pub struct ProofOrchestrator {
    bus: ExtensionBus,
    event_tx: mpsc::UnboundedSender<AppEvent>,
    reporter: Arc<dyn ReportSink>,
    inner: Arc<Mutex<Inner>>,
    sos: SignalOfStop,
}

impl ProofOrchestrator {
    /// Spawn the handler task over the proof demux route.
    pub fn spawn(
        bus: ExtensionBus,
        proof_rx: mpsc::UnboundedReceiver<ProofEvent>,
        event_tx: mpsc::UnboundedSender<AppEvent>,
        reporter: Arc<dyn ReportSink>,
        parent: &SignalOfStop,
    ) -> Self {
        let orchestrator = Self {
            bus,
            event_tx,
            reporter,
            inner: Arc::new(Mutex::new(Inner {
                current: None,
                result: ProofResult::Pending,
            })),
            sos: parent.linked(),
        };
        orchestrator.spawn_event_handler(proof_rx);
        orchestrator
    }

    /// Begin a new attempt, superseding any in-flight one. Returns the
    /// request id attached to the attempt's terminal events.
    pub fn start(&self, request: ProofRequest) -> Uuid {
        let id = Uuid::new_v4();
        let request_sos = {
            let mut inner = self.inner.lock().unwrap();
            if let Some(previous) = inner.current.take() {
                info!(
                    event = "proof_request_superseded",
                    request_id = %previous.id,
                    "Cancelling in-flight proof request"
                );
                previous.sos.cancel();
            }
            inner.result = ProofResult::Pending;
            let request_sos = self.sos.linked();
            inner.current = Some(ActiveRequest {
                id,
                request: request.clone(),
                proof_id: None,
                sos: request_sos.clone(),
            });
            request_sos
        };

        info!(
            event = "proof_request_started",
            request_id = %id,
            platform = %request.platform,
            original_index = request.original_index,
            "Requesting proof generation"
        );
        self.bus.send(&OutboundMessage::GenerateProof {
            intent_hash: request.intent_hash.clone(),
            original_index: request.original_index,
            platform: request.platform.clone(),
            proof_index: request.proof_index,
        });

        self.spawn_poller(id, request_sos.clone());
        self.spawn_timeout(id, request_sos);
        id
    }

    /// Drop the stored proof and cancel any in-flight timers. Callable at
    /// any time (user navigates back).
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(previous) = inner.current.take() {
            previous.sos.cancel();
        }
        inner.result = ProofResult::Pending;
        debug!(event = "proof_state_reset", "Proof state cleared");
    }

    pub fn result(&self) -> ProofResult {
        self.inner.lock().unwrap().result.clone()
    }

    pub fn proof(&self) -> Option<Proof> {
        match &self.inner.lock().unwrap().result {
            ProofResult::Success(proof) => Some(proof.clone()),
            _ => None,
        }
    }

    pub fn dispose(&self) {
        self.reset();
        self.sos.cancel();
    }

    // ── Timer tasks ──────────────────────────────────────────────────────

    fn spawn_poller(&self, request_id: Uuid, sos: SignalOfStop) {
        let bus = self.bus.clone();
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(
                Instant::now() + PROOF_POLL_INTERVAL,
                PROOF_POLL_INTERVAL,
            );
            loop {
                tokio::select! {
                    _ = sos.wait() => return,
                    _ = ticker.tick() => {}
                }
                let proof_id = {
                    let inner = inner.lock().unwrap();
                    match &inner.current {
                        Some(current) if current.id == request_id => current.proof_id.clone(),
                        _ => return,
                    }
                };
                match proof_id {
                    Some(proof_id) => {
                        bus.send(&OutboundMessage::FetchProofById { proof_id });
                    }
                    None => {
                        debug!(
                            event = "proof_poll_skipped",
                            request_id = %request_id,
                            "No proof id assigned yet"
                        );
                    }
                }
            }
        });
    }

    fn spawn_timeout(&self, request_id: Uuid, sos: SignalOfStop) {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sos.wait() => return,
                _ = sleep(PROOF_GENERATION_TIMEOUT) => {}
            }
            this.fail_request(
                request_id,
                "proof generation timed out".to_string(),
                "proof_generation_timeout",
            );
        });
    }

    // ── Inbound events ───────────────────────────────────────────────────

    fn spawn_event_handler(&self, mut proof_rx: mpsc::UnboundedReceiver<ProofEvent>) {
        let this = self.clone();
        let sos = self.sos.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = sos.wait() => return,
                    received = proof_rx.recv() => match received {
                        Some(e) => e,
                        None => return,
                    },
                };
                match event {
                    ProofEvent::IdAssigned(proof_id) => this.on_proof_id(proof_id),
                    ProofEvent::Notary(notary) => this.on_notary(notary),
                }
            }
        });
    }

    fn on_proof_id(&self, proof_id: Option<String>) {
        let (request_id, assigned) = {
            let mut inner = self.inner.lock().unwrap();
            let current = match inner.current.as_mut() {
                Some(c) => c,
                None => {
                    debug!(event = "proof_id_stale", "Proof id arrived with no request in flight");
                    return;
                }
            };
            match proof_id {
                Some(id) => {
                    current.proof_id = Some(id);
                    (current.id, true)
                }
                None => (current.id, false),
            }
        };
        if assigned {
            debug!(event = "proof_id_assigned", request_id = %request_id, "Polling may begin");
            let _ = self.event_tx.send(AppEvent::ProofIdAssigned { request_id });
        } else {
            warn!(
                event = "proof_id_missing",
                request_id = %request_id,
                "Extension has not registered the proof request"
            );
            let _ = self.event_tx.send(AppEvent::ProofIdMissing { request_id });
        }
    }

    fn on_notary(&self, notary: NotaryRequest) {
        // Currency check: a response can only belong to the current
        // request if that request has been assigned the proof id we have
        // been polling with.
        let request_id = {
            let inner = self.inner.lock().unwrap();
            match &inner.current {
                Some(current) if current.proof_id.is_some() && inner.result.is_pending() => {
                    current.id
                }
                _ => {
                    debug!(event = "notary_response_stale", "Dropping notary response for superseded request");
                    return;
                }
            }
        };

        match notary.status {
            NotaryStatus::Pending => {
                debug!(event = "notary_pending", request_id = %request_id, "Proof not ready yet");
            }
            NotaryStatus::Error => {
                let reason = notary
                    .error
                    .unwrap_or_else(|| "extension reported an unspecified error".to_string());
                self.fail_request(request_id, reason, "proof_generation_error");
            }
            NotaryStatus::Success => match notary.proof.as_ref().map(Proof::from_claim_value) {
                Some(Ok(proof)) => self.complete_request(request_id, proof),
                Some(Err(e)) => {
                    self.fail_request(
                        request_id,
                        format!("proof payload failed to decode: {e:#}"),
                        "proof_decode_error",
                    );
                }
                None => {
                    self.fail_request(
                        request_id,
                        "success response carried no proof payload".to_string(),
                        "proof_decode_error",
                    );
                }
            },
        }
    }

    // ── Terminal transitions ─────────────────────────────────────────────

    fn complete_request(&self, request_id: Uuid, proof: Proof) {
        {
            let mut inner = self.inner.lock().unwrap();
            let current = match inner.current.take() {
                Some(c) if c.id == request_id => c,
                other => {
                    inner.current = other;
                    return;
                }
            };
            current.sos.cancel();
            inner.result = ProofResult::Success(proof);
        }
        info!(event = "proof_generation_complete", request_id = %request_id, "Proof stored");
        let _ = self.event_tx.send(AppEvent::ProofCompleted { request_id });
    }

    fn fail_request(&self, request_id: Uuid, reason: String, report_kind: &str) {
        let request = {
            let mut inner = self.inner.lock().unwrap();
            let current = match inner.current.take() {
                Some(c) if c.id == request_id && inner.result.is_pending() => c,
                other => {
                    // Already settled or superseded; nothing fires twice.
                    inner.current = other;
                    return;
                }
            };
            current.sos.cancel();
            inner.result = ProofResult::Error(reason.clone());
            current.request
        };

        warn!(
            event = "proof_generation_failed",
            request_id = %request_id,
            reason = %reason,
            "Proof attempt failed"
        );
        self.reporter.report(
            report_kind,
            &[
                ("platform".to_string(), request.platform.clone()),
                ("intentHash".to_string(), request.intent_hash.clone()),
                (
                    "originalIndex".to_string(),
                    request.original_index.to_string(),
                ),
                ("error".to_string(), reason.clone()),
            ],
        );
        let _ = self.event_tx.send(AppEvent::ProofFailed { request_id, reason });
    }
}
