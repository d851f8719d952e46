//! Centralized configuration constants for PayProof.
//!
//! All tunable parameters live here so they can be reviewed and adjusted
//! in a single place. Wire-format constants (message `type` strings) stay
//! in `core/messages.rs` next to the types they tag.

use std::time::Duration;

// ── Extension liveness polling ───────────────────────────────────────────────

/// Grace period before the first version probe, giving the extension's
/// content script time to attach its bus listener after page load.
pub const VERSION_STARTUP_DELAY: Duration = Duration::from_millis(300);

/// Resend interval for `fetch_extension_version` during the fast-poll
/// phase right after startup.
pub const VERSION_FAST_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Total length of the fast-poll phase. After this window elapses with no
/// reply, the tracker drops to the slow cadence.
pub const VERSION_FAST_POLL_WINDOW: Duration = Duration::from_secs(2);

/// Resend interval once the fast-poll window is exhausted. Runs until a
/// version response arrives; there is no give-up point.
pub const VERSION_SLOW_POLL_INTERVAL: Duration = Duration::from_secs(5);

// ── Proof generation ─────────────────────────────────────────────────────────

/// Poll interval for `fetch_proof_by_id` while a proof request is in
/// flight.
pub const PROOF_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Absolute ceiling on one proof generation attempt, measured from
/// `start()`. Not extended by partial progress; a late success arriving
/// after this fires is discarded.
pub const PROOF_GENERATION_TIMEOUT: Duration = Duration::from_secs(60);

// ── Metadata expiry ──────────────────────────────────────────────────────────

/// Cadence of the pull-based expiry check over cached payment metadata.
pub const METADATA_EXPIRY_TICK: Duration = Duration::from_secs(1);

/// Safety margin subtracted from the extension-reported `expiresAt`.
/// A payment selected inside this margin could not finish proof
/// generation and on-chain submission before the underlying record
/// expires, so it is treated as already expired.
pub const METADATA_EXPIRY_BUFFER_MS: u64 = 30_000;

// ── Diagnostics ──────────────────────────────────────────────────────────────

/// Maximum log entries kept in the in-memory ring buffer.
pub const MAX_LOG_ENTRIES: usize = 500;

/// Maximum diagnostic reports retained by the buffered reporting sink.
pub const MAX_REPORT_ENTRIES: usize = 100;
