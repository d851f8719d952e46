//! Demo driver: runs the full verification flow against the scripted
//! extension and narrates every status change through the tracing stack.
//!
//! This is the only place that advances the verification machine: the
//! client components emit events, the driver decides what they mean for
//! the UI state, exactly as a rendering front end would.

use crate::core::client::{AppEvent, ExtensionClient};
use crate::core::intent::{
    intent_hash_to_decimal, intent_hash_to_hex, Intent, IntentReader, StaticIntentReader,
};
use crate::core::messages::PaymentCandidate;
use crate::core::orchestrator::ProofRequest;
use crate::core::proof;
use crate::core::reporting::BufferedReporter;
use crate::core::selection::SelectionGuard;
use crate::core::upload::{LocalUploadApi, UploadApi};
use crate::core::verification::{VerificationMachine, VerificationStatus};
use crate::ui::status::{cta_with_selection, steps};
use crate::utils::log_buffer::LogBuffer;
use crate::utils::sos::SignalOfStop;
use crate::workers::args::Args;
use crate::workers::harness::{self, HarnessConfig, ScriptedOutcome};
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Demo retry budget for failed proof attempts.
const MAX_PROOF_RETRIES: u32 = 1;

/// Pacing for the externally-triggered transaction/swap stages.
const STAGE_DELAY: Duration = Duration::from_millis(250);

pub async fn run(args: Args, sos: SignalOfStop, log_buffer: LogBuffer) -> Result<()> {
    let reporter = Arc::new(BufferedReporter::new());
    let (event_tx, mut events) = mpsc::unbounded_channel();
    let (client, endpoint) =
        ExtensionClient::new(args.origin.clone(), reporter.clone(), event_tx, &sos);

    let mut config = HarnessConfig::default();
    config.proof_ready_after = Duration::from_secs(4);
    config.metadata.insert(args.platform.clone(), demo_candidates());
    if args.simulate_failure {
        config.proof_outcome =
            ScriptedOutcome::FailOnce("notary session interrupted".to_string());
    }
    harness::spawn(endpoint, config, sos.clone());

    let outcome = drive(&args, &client, &mut events, &sos).await;
    client.dispose();

    for report in reporter.reports() {
        info!(
            event = "diagnostic_report",
            at_ms = report.timestamp_ms,
            message = %report.message,
            context = ?report.context,
            "Collected report"
        );
    }
    let entries = log_buffer.entries();
    for entry in entries.iter().rev().take(3).rev() {
        info!(
            event = "log_tail",
            at = %entry.timestamp,
            level = %entry.level,
            line = %entry.message,
            "Recent diagnostics"
        );
    }

    outcome
}

async fn drive(
    args: &Args,
    client: &ExtensionClient,
    events: &mut mpsc::UnboundedReceiver<AppEvent>,
    sos: &SignalOfStop,
) -> Result<()> {
    let mut machine = VerificationMachine::new();
    let mut guard = SelectionGuard::new();

    // 1. Extension detection.
    loop {
        match next_event(events, sos).await? {
            AppEvent::ExtensionConnected { version } => {
                info!(event = "driver_connected", version = %version, "Extension detected");
                break;
            }
            other => absorb(&mut guard, other),
        }
    }

    // 2. Metadata.
    client.metadata().request_metadata(&args.platform);
    loop {
        match next_event(events, sos).await? {
            AppEvent::MetadataUpdated { platform, count } if platform == args.platform => {
                guard.on_metadata_refreshed();
                info!(event = "driver_metadata", count, "Payment list loaded");
                break;
            }
            other => absorb(&mut guard, other),
        }
    }

    let metadata = client
        .metadata()
        .get(&args.platform)
        .ok_or_else(|| anyhow!("metadata vanished after update event"))?;
    let candidate = match metadata.entries.iter().find(|c| !c.hidden) {
        Some(c) => c.clone(),
        None => {
            // Loaded-but-empty is a real, distinct outcome.
            info!(event = "driver_no_payments", "No payments found for this platform");
            return Ok(());
        }
    };

    // 3. Selection.
    if !guard.click_row(candidate.clone()) {
        return Err(anyhow!("payment selection was rejected"));
    }
    log_status(&machine, &guard);

    // Display cross-check against the on-chain intent record.
    let intents = seeded_intents(args, &candidate);
    match intents.get_intent(&args.intent_hash) {
        Ok(intent) => info!(
            event = "driver_intent",
            amount = %intent.amount,
            currency = %intent.currency,
            payee = %intent.payee_id,
            "Intent record"
        ),
        Err(e) => warn!(event = "driver_intent_missing", error = %e, "Proceeding without intent cross-check"),
    }

    // 4. Proof generation, with the demo retry budget.
    let request = ProofRequest {
        platform: args.platform.clone(),
        intent_hash: intent_hash_to_decimal(&args.intent_hash)
            .context("intent hash on the command line is invalid")?,
        original_index: candidate.original_index,
        proof_index: None,
    };

    info!(
        event = "driver_intent_hash",
        decimal = %request.intent_hash,
        hex = %intent_hash_to_hex(&request.intent_hash)?,
        "Intent hash handed to the extension"
    );

    let mut retries = 0u32;
    advance(&mut machine, &guard, VerificationStatus::RequestingProof);
    let mut current_request = client.orchestrator().start(request.clone());

    loop {
        match next_event(events, sos).await? {
            AppEvent::ProofIdAssigned { request_id } if request_id == current_request => {
                advance(&mut machine, &guard, VerificationStatus::RequestingProofSuccess);
                advance(&mut machine, &guard, VerificationStatus::GeneratingProof);
            }
            AppEvent::ProofIdMissing { request_id } if request_id == current_request => {
                advance(&mut machine, &guard, VerificationStatus::RequestingProofFailed);
                advance(&mut machine, &guard, VerificationStatus::GeneratingProof);
            }
            AppEvent::ProofCompleted { request_id } if request_id == current_request => {
                advance(&mut machine, &guard, VerificationStatus::TransactionConfigured);
                break;
            }
            AppEvent::ProofFailed { request_id, reason } if request_id == current_request => {
                advance(&mut machine, &guard, VerificationStatus::ErrorFailedToProve);
                if retries >= MAX_PROOF_RETRIES {
                    return Err(anyhow!("proof generation failed: {reason}"));
                }
                retries += 1;
                info!(event = "driver_retry", attempt = retries + 1, "Retrying with the same payment");
                advance(&mut machine, &guard, VerificationStatus::RequestingProof);
                current_request = client.orchestrator().start(request.clone());
            }
            other => absorb(&mut guard, other),
        }
    }

    let proof = client
        .orchestrator()
        .proof()
        .ok_or_else(|| anyhow!("proof missing after completion event"))?;

    // 5. Transaction and swap stages (triggered outside this client; the
    // demo walks them on a fixed cadence).
    for status in [
        VerificationStatus::TransactionSimulating,
        VerificationStatus::TransactionSimulationSuccessful,
        VerificationStatus::TransactionLoading,
        VerificationStatus::TransactionMining,
        VerificationStatus::SwapQuoteRequesting,
        VerificationStatus::SwapQuoteSuccess,
        VerificationStatus::SwapTransactionSigning,
        VerificationStatus::SwapTransactionMining,
        VerificationStatus::Done,
    ] {
        if sos.select(tokio::time::sleep(STAGE_DELAY)).await.is_err() {
            return Err(anyhow!("cancelled"));
        }
        advance(&mut machine, &guard, status);
    }

    // 6. Encode for submission and park a copy at the upload API.
    let encoded = proof::encode(&proof);
    let uploads = LocalUploadApi::new("https://uploads.payproof.test");
    let slot = uploads.create_upload(&args.platform, None)?;
    info!(
        event = "driver_done",
        encoded_bytes = encoded.len(),
        submission_id = %slot.submission_id,
        forward_navigation = machine.status().offers_forward(),
        "Verification complete"
    );
    Ok(())
}

/// Events that do not gate the current step still update the guard.
fn absorb(guard: &mut SelectionGuard, event: AppEvent) {
    match event {
        AppEvent::MetadataExpired { platform } => {
            warn!(event = "driver_payments_expired", platform = %platform, "Selection locked until refresh");
            guard.on_expired();
        }
        AppEvent::MetadataUpdated { .. } => guard.on_metadata_refreshed(),
        other => {
            info!(event = "driver_event_ignored", detail = ?other, "Out-of-step event");
        }
    }
}

fn advance(machine: &mut VerificationMachine, guard: &SelectionGuard, next: VerificationStatus) {
    if machine.advance(next) {
        log_status(machine, guard);
    }
}

fn log_status(machine: &VerificationMachine, guard: &SelectionGuard) {
    let status = machine.status();
    let cta = cta_with_selection(status, guard.status());
    let step_states = steps(status);
    info!(
        event = "verification_status",
        status = ?status,
        cta = cta.label,
        disabled = cta.disabled,
        loading = cta.loading,
        steps = ?step_states,
        "Status changed"
    );
}

async fn next_event(
    events: &mut mpsc::UnboundedReceiver<AppEvent>,
    sos: &SignalOfStop,
) -> Result<AppEvent> {
    tokio::select! {
        _ = sos.wait() => Err(anyhow!("cancelled")),
        received = events.recv() => received.ok_or_else(|| anyhow!("event stream closed")),
    }
}

fn demo_candidates() -> Vec<PaymentCandidate> {
    vec![
        PaymentCandidate {
            recipient: "maria-r".to_string(),
            amount: "42.00".to_string(),
            date: "2025-07-28".to_string(),
            currency: "USD".to_string(),
            payment_id: "4128745902".to_string(),
            original_index: 0,
            hidden: false,
        },
        PaymentCandidate {
            recipient: "coffee-cart".to_string(),
            amount: "6.25".to_string(),
            date: "2025-07-30".to_string(),
            currency: "USD".to_string(),
            payment_id: "4129981113".to_string(),
            original_index: 1,
            hidden: true,
        },
        PaymentCandidate {
            recipient: "j-santos".to_string(),
            amount: "120.00".to_string(),
            date: "2025-08-02".to_string(),
            currency: "USD".to_string(),
            payment_id: "4133307745".to_string(),
            original_index: 2,
            hidden: false,
        },
    ]
}

fn seeded_intents(args: &Args, candidate: &PaymentCandidate) -> StaticIntentReader {
    let mut intents = StaticIntentReader::new();
    intents.insert(
        &args.intent_hash,
        Intent {
            amount: candidate.amount.clone(),
            timestamp_s: 1_753_660_800,
            payment_method: args.platform.clone(),
            currency: candidate.currency.clone(),
            conversion_rate: "1.0".to_string(),
            payee_id: candidate.recipient.clone(),
        },
    );
    intents
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn demo_flow_reaches_done() {
        let args = Args::default();
        let sos = SignalOfStop::new();
        let buffer = LogBuffer::new();
        run(args, sos, buffer).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn demo_flow_recovers_from_one_failure() {
        let args = Args { simulate_failure: true, ..Args::default() };
        let sos = SignalOfStop::new();
        let buffer = LogBuffer::new();
        run(args, sos, buffer).await.unwrap();
    }
}
