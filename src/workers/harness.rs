//! Scripted extension double.
//!
//! Plays the extension's side of the bus contract with configurable
//! delays and outcomes: answers version probes, pushes metadata after a
//! tab-open, registers proof requests, and serves notary polls as
//! pending until the configured readiness point. The demo binary runs the
//! whole client flow against it; tests use it for end-to-end scenarios.

use crate::core::bus::{BusEndpoint, EventPusher};
use crate::core::messages::{
    InboundMessage, NotaryRequest, NotaryStatus, OutboundMessage, PaymentCandidate,
    RequestHistory,
};
use crate::core::proof::ClaimInfo;
use crate::utils::sos::SignalOfStop;
use serde_json::json;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};
use tokio::time::{sleep, Instant};
use tracing::debug;

/// How a scripted proof attempt ends.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Succeed,
    Fail(String),
    /// First attempt fails with the reason; retries succeed.
    FailOnce(String),
}

/// Behaviour knobs for the scripted extension.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub version: String,
    /// Delay before each version probe is answered.
    pub version_reply_delay: Duration,
    /// Candidate lists per platform, pushed after an `open_new_tab`.
    pub metadata: HashMap<String, Vec<PaymentCandidate>>,
    pub metadata_reply_delay: Duration,
    /// Pushed `expiresAt` is now plus this window.
    pub metadata_validity: Duration,
    /// Delay before `fetch_proof_request_id_response`.
    pub proof_id_delay: Duration,
    /// Time from `generate_proof` until polls stop answering `pending`.
    pub proof_ready_after: Duration,
    pub proof_outcome: ScriptedOutcome,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            version: "1.3.7".to_string(),
            version_reply_delay: Duration::from_millis(120),
            metadata: HashMap::new(),
            metadata_reply_delay: Duration::from_millis(400),
            metadata_validity: Duration::from_secs(600),
            proof_id_delay: Duration::from_millis(200),
            proof_ready_after: Duration::from_secs(5),
            proof_outcome: ScriptedOutcome::Succeed,
        }
    }
}

struct PendingProof {
    started_at: Instant,
    /// 1-based position of this request in the session.
    attempt: u32,
    intent_hash: String,
    platform: String,
    original_index: u32,
}

/// Run the scripted extension until the signal stops it.
pub fn spawn(mut endpoint: BusEndpoint, config: HarnessConfig, sos: SignalOfStop) {
    tokio::spawn(async move {
        let pusher = endpoint.pusher();
        let mut proof_counter = 0u32;
        let mut proofs: HashMap<String, PendingProof> = HashMap::new();

        loop {
            let command = tokio::select! {
                _ = sos.wait() => return,
                received = endpoint.next_command() => match received {
                    Some(c) => c,
                    None => return,
                },
            };
            debug!(event = "harness_command", command = ?command, "Scripted extension received command");

            match command {
                OutboundMessage::FetchVersion => {
                    reply_later(&pusher, config.version_reply_delay, InboundMessage::VersionResponse {
                        version: config.version.clone(),
                    });
                }
                OutboundMessage::OpenNewTab { platform, .. } => {
                    let entries = config.metadata.get(&platform).cloned().unwrap_or_default();
                    let expires_at = unix_ms() + config.metadata_validity.as_millis() as u64;
                    reply_later(
                        &pusher,
                        config.metadata_reply_delay,
                        InboundMessage::MetadataResponse { platform, metadata: entries, expires_at },
                    );
                }
                OutboundMessage::OpenSidebar { route } => {
                    debug!(event = "harness_sidebar", route = %route, "Sidebar opened (no reply)");
                }
                OutboundMessage::GenerateProof { intent_hash, original_index, platform, .. } => {
                    proof_counter += 1;
                    let proof_id = format!("proof-{proof_counter}");
                    proofs.insert(proof_id.clone(), PendingProof {
                        started_at: Instant::now(),
                        attempt: proof_counter,
                        intent_hash,
                        platform,
                        original_index,
                    });
                    reply_later(
                        &pusher,
                        config.proof_id_delay,
                        InboundMessage::ProofIdResponse { proof_id: Some(proof_id) },
                    );
                }
                OutboundMessage::FetchProofById { proof_id } => {
                    let notary_request = match proofs.get(&proof_id) {
                        None => NotaryRequest {
                            status: NotaryStatus::Error,
                            proof: None,
                            error: Some(format!("unknown proof id {proof_id}")),
                        },
                        Some(pending) if pending.started_at.elapsed() < config.proof_ready_after => {
                            NotaryRequest { status: NotaryStatus::Pending, proof: None, error: None }
                        }
                        Some(pending) => {
                            let failure = match &config.proof_outcome {
                                ScriptedOutcome::Succeed => None,
                                ScriptedOutcome::Fail(reason) => Some(reason.clone()),
                                ScriptedOutcome::FailOnce(reason) if pending.attempt == 1 => {
                                    Some(reason.clone())
                                }
                                ScriptedOutcome::FailOnce(_) => None,
                            };
                            match failure {
                                Some(reason) => NotaryRequest {
                                    status: NotaryStatus::Error,
                                    proof: None,
                                    error: Some(reason),
                                },
                                None => NotaryRequest {
                                    status: NotaryStatus::Success,
                                    proof: Some(fabricate_claim(pending)),
                                    error: None,
                                },
                            }
                        }
                    };
                    pusher.push(&InboundMessage::ProofByIdResponse {
                        request_history: RequestHistory { notary_request },
                    });
                }
            }
        }
    });
}

fn reply_later(pusher: &EventPusher, delay: Duration, message: InboundMessage) {
    let pusher = pusher.clone();
    tokio::spawn(async move {
        sleep(delay).await;
        pusher.push(&message);
    });
}

/// Build a structurally valid signed claim for a finished request, with
/// the identifier derived the same way the verifier derives it.
fn fabricate_claim(pending: &PendingProof) -> serde_json::Value {
    let claim_info = ClaimInfo {
        provider: "http".to_string(),
        parameters: format!(
            r#"{{"platform":"{}","originalIndex":{}}}"#,
            pending.platform, pending.original_index
        ),
        context: format!(r#"{{"contextMessage":"{}"}}"#, pending.intent_hash),
    };
    json!({
        "claimInfo": {
            "provider": claim_info.provider,
            "parameters": claim_info.parameters,
            "context": claim_info.context,
        },
        "signedClaim": {
            "claim": {
                "identifier": format!("{:?}", claim_info.identifier()),
                "owner": "0x244897572368eadf65bfbc5aec98d8e5443a9072",
                "timestampS": (unix_ms() / 1000) as u32,
                "epoch": 1,
            },
            "signatures": [format!("0x{}", "ab".repeat(65))],
        },
        "isAppclipProof": false,
    })
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
