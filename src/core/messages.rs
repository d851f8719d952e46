//! Wire messages exchanged with the companion extension.
//!
//! Both directions are closed tagged unions discriminated by the `type`
//! field. Outbound commands are fire-and-forget; no acknowledgement is
//! guaranteed. Inbound events arrive unprompted on the shared bus and are
//! parsed here before any component sees them. Unknown `type` values are
//! skipped quietly (newer extensions may emit kinds we do not know yet),
//! while a known `type` with a malformed body is logged and dropped.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

// ── Outbound commands ────────────────────────────────────────────────────────

/// Commands the client posts to the extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    /// Probe for extension presence and version.
    #[serde(rename = "fetch_extension_version")]
    FetchVersion,

    /// Ask the extension to open a platform tab (drives re-authentication
    /// and, as a side effect, a metadata refresh push).
    #[serde(rename = "open_new_tab")]
    OpenNewTab {
        #[serde(rename = "actionType")]
        action_type: String,
        platform: String,
    },

    /// Ask the extension to open its sidebar on a given route.
    #[serde(rename = "open_sidebar")]
    OpenSidebar { route: String },

    /// Kick off proof generation for one payment candidate.
    #[serde(rename = "generate_proof")]
    GenerateProof {
        /// Intent hash as a decimal string (see `core::intent`).
        #[serde(rename = "intentHash")]
        intent_hash: String,
        /// Position of the candidate in the extension's own list. The only
        /// identifier the extension accepts, never a display index.
        #[serde(rename = "originalIndex")]
        original_index: u32,
        platform: String,
        /// Opaque pass-through selecting among multiple proofs for one
        /// candidate. Semantics live extension-side.
        #[serde(rename = "proofIndex", skip_serializing_if = "Option::is_none")]
        proof_index: Option<u32>,
    },

    /// Poll for the result of a previously issued `generate_proof`.
    #[serde(rename = "fetch_proof_by_id")]
    FetchProofById {
        #[serde(rename = "proofId")]
        proof_id: String,
    },
}

// ── Inbound events ───────────────────────────────────────────────────────────

/// One historical payment the extension offers as provable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentCandidate {
    pub recipient: String,
    pub amount: String,
    pub date: String,
    pub currency: String,
    #[serde(rename = "paymentId")]
    pub payment_id: String,
    /// Stable position in the extension's source list. Display order may
    /// differ and must never be sent in its place.
    #[serde(rename = "originalIndex")]
    pub original_index: u32,
    #[serde(default)]
    pub hidden: bool,
}

/// Notary-side status of a proof request, as reported by the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotaryStatus {
    Pending,
    Success,
    Error,
}

/// The `requestHistory.notaryRequest` body of a proof poll response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotaryRequest {
    pub status: NotaryStatus,
    /// Opaque signed-claim object; parsed by `core::proof` only on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestHistory {
    #[serde(rename = "notaryRequest")]
    pub notary_request: NotaryRequest,
}

/// Events the extension pushes back to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "extension_version_response")]
    VersionResponse { version: String },

    /// Wholesale replacement of one platform's candidate list.
    #[serde(rename = "metadata_messages_response")]
    MetadataResponse {
        platform: String,
        metadata: Vec<PaymentCandidate>,
        /// Unix milliseconds after which the extension-side records lapse.
        #[serde(rename = "expiresAt")]
        expires_at: u64,
    },

    /// Reply to `generate_proof` carrying the id to poll with. A null id
    /// means the extension has not registered the request (yet).
    #[serde(rename = "fetch_proof_request_id_response")]
    ProofIdResponse {
        #[serde(rename = "proofId")]
        proof_id: Option<String>,
    },

    /// Reply to `fetch_proof_by_id`.
    #[serde(rename = "fetch_proof_by_id_response")]
    ProofByIdResponse {
        #[serde(rename = "requestHistory")]
        request_history: RequestHistory,
    },
}

/// Parse a raw bus payload into an [`InboundMessage`].
///
/// Returns `None` for anything that should be dropped: a payload without a
/// string `type`, an unknown `type` (forward compatibility, debug only),
/// or a known `type` whose body fails validation (warned; a malformed
/// shape is never trusted).
pub fn parse_inbound(value: &Value) -> Option<InboundMessage> {
    let kind = match value.get("type").and_then(Value::as_str) {
        Some(k) => k.to_string(),
        None => {
            debug!(event = "bus_message_untyped", "Dropping bus payload without a type field");
            return None;
        }
    };

    match serde_json::from_value::<InboundMessage>(value.clone()) {
        Ok(msg) => Some(msg),
        Err(e) if KNOWN_INBOUND_TYPES.contains(&kind.as_str()) => {
            warn!(
                event = "bus_message_malformed",
                message_type = %kind,
                error = %e,
                "Dropping malformed extension message"
            );
            None
        }
        Err(_) => {
            debug!(
                event = "bus_message_unknown_type",
                message_type = %kind,
                "Ignoring unknown extension message type"
            );
            None
        }
    }
}

/// Inbound `type` discriminators this client understands.
const KNOWN_INBOUND_TYPES: &[&str] = &[
    "extension_version_response",
    "metadata_messages_response",
    "fetch_proof_request_id_response",
    "fetch_proof_by_id_response",
];
