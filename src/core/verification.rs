//! Verification state machine.
//!
//! A single enumerated status describes one verification attempt from
//! payment selection to completed swap. The machine is a pure transition
//! table (no timers, no transport) driven by the proof orchestrator's
//! terminal events and by externally-triggered transaction stages. The UI
//! mapping over these statuses lives in `ui::status`.

use tracing::warn;

/// All states one verification attempt can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationStatus {
    /// Nothing started; user is still on payment selection.
    NotStarted,
    /// Asking the extension to register a proof request.
    RequestingProof,
    RequestingProofSuccess,
    RequestingProofFailed,
    /// Extension/notary is producing the attestation; client is polling.
    GeneratingProof,
    /// Proof generation failed (transport silence, extension error, or
    /// decode failure all collapse here). Retryable.
    ErrorFailedToProve,
    /// Proof in hand; the release transaction is assembled.
    TransactionConfigured,
    TransactionSimulating,
    TransactionSimulationSuccessful,
    /// Simulation rejected the transaction. Retryable.
    TransactionSimulationFailed,
    TransactionLoading,
    TransactionMining,
    /// Release transaction reverted or was dropped.
    TransactionFailed,
    SwapQuoteRequesting,
    SwapQuoteSuccess,
    SwapQuoteFailed,
    SwapTransactionSigning,
    SwapTransactionMining,
    SwapTransactionFailed,
    /// Funds released and swapped; forward navigation is offered.
    Done,
}

impl VerificationStatus {
    /// Every status, for exhaustiveness-style assertions in tests.
    pub const ALL: [VerificationStatus; 20] = [
        VerificationStatus::NotStarted,
        VerificationStatus::RequestingProof,
        VerificationStatus::RequestingProofSuccess,
        VerificationStatus::RequestingProofFailed,
        VerificationStatus::GeneratingProof,
        VerificationStatus::ErrorFailedToProve,
        VerificationStatus::TransactionConfigured,
        VerificationStatus::TransactionSimulating,
        VerificationStatus::TransactionSimulationSuccessful,
        VerificationStatus::TransactionSimulationFailed,
        VerificationStatus::TransactionLoading,
        VerificationStatus::TransactionMining,
        VerificationStatus::TransactionFailed,
        VerificationStatus::SwapQuoteRequesting,
        VerificationStatus::SwapQuoteSuccess,
        VerificationStatus::SwapQuoteFailed,
        VerificationStatus::SwapTransactionSigning,
        VerificationStatus::SwapTransactionMining,
        VerificationStatus::SwapTransactionFailed,
        VerificationStatus::Done,
    ];

    /// The transition table: statuses this one may advance to. Returning
    /// to `NotStarted` (user goes back to selection) is always allowed and
    /// handled by [`VerificationMachine::reset`], so it is not listed.
    pub fn allowed_next(&self) -> &'static [VerificationStatus] {
        use VerificationStatus::*;
        match self {
            NotStarted => &[RequestingProof],
            RequestingProof => &[RequestingProofSuccess, RequestingProofFailed],
            RequestingProofSuccess => &[GeneratingProof],
            RequestingProofFailed => &[GeneratingProof],
            GeneratingProof => &[ErrorFailedToProve, TransactionConfigured],
            ErrorFailedToProve => &[RequestingProof],
            TransactionConfigured => &[TransactionSimulating],
            TransactionSimulating => {
                &[TransactionSimulationSuccessful, TransactionSimulationFailed]
            }
            TransactionSimulationSuccessful => &[TransactionLoading],
            TransactionSimulationFailed => &[RequestingProof],
            TransactionLoading => &[TransactionMining],
            TransactionMining => &[TransactionFailed, SwapQuoteRequesting],
            TransactionFailed => &[],
            SwapQuoteRequesting => &[SwapQuoteSuccess, SwapQuoteFailed],
            SwapQuoteSuccess => &[SwapTransactionSigning],
            SwapQuoteFailed => &[SwapTransactionSigning],
            SwapTransactionSigning => &[SwapTransactionMining],
            SwapTransactionMining => &[SwapTransactionFailed, Done],
            SwapTransactionFailed => &[],
            Done => &[],
        }
    }

    /// Only these states offer the "try again" action (which re-invokes
    /// the orchestrator with the same candidate).
    pub fn offers_retry(&self) -> bool {
        matches!(
            self,
            VerificationStatus::ErrorFailedToProve
                | VerificationStatus::TransactionSimulationFailed
        )
    }

    /// Only `Done` offers navigation away from verification.
    pub fn offers_forward(&self) -> bool {
        matches!(self, VerificationStatus::Done)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_next().is_empty()
    }
}

/// Holds the current status and enforces the transition table.
#[derive(Debug, Clone)]
pub struct VerificationMachine {
    status: VerificationStatus,
}

impl VerificationMachine {
    pub fn new() -> Self {
        Self { status: VerificationStatus::NotStarted }
    }

    pub fn status(&self) -> VerificationStatus {
        self.status
    }

    /// Advance to `next` if the table allows it. An illegal transition is
    /// rejected and logged; the status is left untouched.
    pub fn advance(&mut self, next: VerificationStatus) -> bool {
        if self.status.allowed_next().contains(&next) {
            self.status = next;
            true
        } else {
            warn!(
                event = "verification_illegal_transition",
                from = ?self.status,
                to = ?next,
                "Rejected verification transition"
            );
            false
        }
    }

    /// Return to payment selection. Allowed from every status.
    pub fn reset(&mut self) {
        self.status = VerificationStatus::NotStarted;
    }
}

impl Default for VerificationMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use VerificationStatus::*;

    #[test]
    fn happy_path_walks_the_table() {
        let mut machine = VerificationMachine::new();
        for next in [
            RequestingProof,
            RequestingProofSuccess,
            GeneratingProof,
            TransactionConfigured,
            TransactionSimulating,
            TransactionSimulationSuccessful,
            TransactionLoading,
            TransactionMining,
            SwapQuoteRequesting,
            SwapQuoteSuccess,
            SwapTransactionSigning,
            SwapTransactionMining,
            Done,
        ] {
            assert!(machine.advance(next), "expected transition into {next:?}");
        }
        assert!(machine.status().offers_forward());
        assert!(machine.status().is_terminal());
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut machine = VerificationMachine::new();
        assert!(!machine.advance(Done));
        assert!(!machine.advance(GeneratingProof));
        assert_eq!(machine.status(), NotStarted);

        machine.advance(RequestingProof);
        assert!(!machine.advance(TransactionMining));
        assert_eq!(machine.status(), RequestingProof);
    }

    #[test]
    fn retry_is_offered_exactly_where_specified() {
        for status in VerificationStatus::ALL {
            let expected =
                matches!(status, ErrorFailedToProve | TransactionSimulationFailed);
            assert_eq!(status.offers_retry(), expected, "retry flag for {status:?}");
        }
    }

    #[test]
    fn retry_re_enters_the_proof_flow() {
        let mut machine = VerificationMachine::new();
        machine.advance(RequestingProof);
        machine.advance(RequestingProofSuccess);
        machine.advance(GeneratingProof);
        machine.advance(ErrorFailedToProve);
        assert!(machine.advance(RequestingProof));
    }

    #[test]
    fn reset_is_allowed_from_everywhere() {
        for status in VerificationStatus::ALL {
            let mut machine = VerificationMachine { status };
            machine.reset();
            assert_eq!(machine.status(), NotStarted);
        }
    }

    #[test]
    fn every_listed_successor_is_reachable_in_the_table() {
        // Each non-initial status must be someone's successor (no orphans).
        for target in VerificationStatus::ALL {
            if target == NotStarted {
                continue;
            }
            let reachable = VerificationStatus::ALL
                .iter()
                .any(|s| s.allowed_next().contains(&target));
            assert!(reachable, "{target:?} is unreachable");
        }
    }
}
