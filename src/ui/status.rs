//! Pure display mapping over verification statuses.
//!
//! Each status maps deterministically to a CTA spec and to a sub-state
//! for each of the four displayed steps (selected payment, prove, submit,
//! swap). The matches are exhaustive on purpose: adding a status without
//! extending the mapping is a compile error, not a silent default.
//!
//! No rendering happens here; callers own presentation.

use crate::core::selection::ValidatePaymentStatus;
use crate::core::verification::VerificationStatus;

/// What the call-to-action button shows and accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CtaSpec {
    pub label: &'static str,
    pub disabled: bool,
    pub loading: bool,
}

/// Sub-state of one step row in the vertical step list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Default,
    Loading,
    Complete,
    Error,
}

/// The four displayed steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepsSpec {
    pub payment: StepState,
    pub prove: StepState,
    pub submit: StepState,
    pub swap: StepState,
}

/// CTA mapping as a pure function of status alone.
pub fn cta(status: VerificationStatus) -> CtaSpec {
    use VerificationStatus::*;
    match status {
        NotStarted => CtaSpec { label: "Verify payment", disabled: false, loading: false },
        RequestingProof => CtaSpec { label: "Requesting proof…", disabled: true, loading: true },
        RequestingProofSuccess => {
            CtaSpec { label: "Proof request registered", disabled: true, loading: true }
        }
        RequestingProofFailed => {
            CtaSpec { label: "Proof request incomplete", disabled: true, loading: true }
        }
        GeneratingProof => CtaSpec { label: "Generating proof…", disabled: true, loading: true },
        ErrorFailedToProve => CtaSpec { label: "Try again", disabled: false, loading: false },
        TransactionConfigured => {
            CtaSpec { label: "Submit transaction", disabled: false, loading: false }
        }
        TransactionSimulating => {
            CtaSpec { label: "Simulating transaction…", disabled: true, loading: true }
        }
        TransactionSimulationSuccessful => {
            CtaSpec { label: "Simulation passed", disabled: true, loading: true }
        }
        TransactionSimulationFailed => {
            CtaSpec { label: "Try again", disabled: false, loading: false }
        }
        TransactionLoading => {
            CtaSpec { label: "Submitting transaction…", disabled: true, loading: true }
        }
        TransactionMining => {
            CtaSpec { label: "Waiting for confirmation…", disabled: true, loading: true }
        }
        TransactionFailed => CtaSpec { label: "Transaction failed", disabled: true, loading: false },
        SwapQuoteRequesting => {
            CtaSpec { label: "Fetching swap quote…", disabled: true, loading: true }
        }
        SwapQuoteSuccess => CtaSpec { label: "Swap quote ready", disabled: true, loading: true },
        SwapQuoteFailed => {
            CtaSpec { label: "Continuing without quote…", disabled: true, loading: true }
        }
        SwapTransactionSigning => {
            CtaSpec { label: "Awaiting signature…", disabled: true, loading: true }
        }
        SwapTransactionMining => CtaSpec { label: "Swapping…", disabled: true, loading: true },
        SwapTransactionFailed => CtaSpec { label: "Swap failed", disabled: true, loading: false },
        Done => CtaSpec { label: "Go to balances", disabled: false, loading: false },
    }
}

/// CTA with the selection guard folded in. Only `NotStarted` consults the
/// guard (once verification is underway the status alone decides), except
/// for the expired lockout, which always wins.
pub fn cta_with_selection(
    status: VerificationStatus,
    selection: ValidatePaymentStatus,
) -> CtaSpec {
    if selection == ValidatePaymentStatus::PaymentsExpired {
        return CtaSpec { label: "Refresh payments to continue", disabled: true, loading: false };
    }
    if status == VerificationStatus::NotStarted
        && selection == ValidatePaymentStatus::Default
    {
        return CtaSpec { label: "Select a payment", disabled: true, loading: false };
    }
    cta(status)
}

/// Step-list mapping as a pure function of status alone.
pub fn steps(status: VerificationStatus) -> StepsSpec {
    use StepState::*;
    use VerificationStatus::*;
    match status {
        NotStarted => StepsSpec { payment: Default, prove: Default, submit: Default, swap: Default },
        RequestingProof | RequestingProofSuccess | RequestingProofFailed | GeneratingProof => {
            StepsSpec { payment: Complete, prove: Loading, submit: Default, swap: Default }
        }
        ErrorFailedToProve => {
            StepsSpec { payment: Complete, prove: Error, submit: Default, swap: Default }
        }
        TransactionConfigured => {
            StepsSpec { payment: Complete, prove: Complete, submit: Default, swap: Default }
        }
        TransactionSimulating
        | TransactionSimulationSuccessful
        | TransactionLoading
        | TransactionMining => {
            StepsSpec { payment: Complete, prove: Complete, submit: Loading, swap: Default }
        }
        TransactionSimulationFailed | TransactionFailed => {
            StepsSpec { payment: Complete, prove: Complete, submit: Error, swap: Default }
        }
        SwapQuoteRequesting
        | SwapQuoteSuccess
        | SwapQuoteFailed
        | SwapTransactionSigning
        | SwapTransactionMining => {
            StepsSpec { payment: Complete, prove: Complete, submit: Complete, swap: Loading }
        }
        SwapTransactionFailed => {
            StepsSpec { payment: Complete, prove: Complete, submit: Complete, swap: Error }
        }
        Done => StepsSpec { payment: Complete, prove: Complete, submit: Complete, swap: Complete },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_status_has_a_nonempty_cta_label() {
        for status in VerificationStatus::ALL {
            let spec = cta(status);
            assert!(!spec.label.is_empty(), "empty CTA label for {status:?}");
            // A spinner on an actionable button makes no sense.
            if spec.loading {
                assert!(spec.disabled, "loading but enabled for {status:?}");
            }
        }
    }

    #[test]
    fn every_status_has_step_states() {
        for status in VerificationStatus::ALL {
            let spec = steps(status);
            if status == VerificationStatus::Done {
                assert_eq!(spec.swap, StepState::Complete);
            }
            // Steps complete left to right: a later step never outruns an
            // earlier one.
            let rank = |s: StepState| match s {
                StepState::Complete => 2,
                StepState::Loading | StepState::Error => 1,
                StepState::Default => 0,
            };
            assert!(rank(spec.payment) >= rank(spec.prove) || spec.payment == StepState::Default);
            assert!(rank(spec.prove) >= rank(spec.submit) || spec.prove == StepState::Default);
            assert!(rank(spec.submit) >= rank(spec.swap) || spec.submit == StepState::Default);
        }
    }

    #[test]
    fn retry_states_have_actionable_ctas() {
        for status in VerificationStatus::ALL {
            if status.offers_retry() {
                let spec = cta(status);
                assert!(!spec.disabled, "retry state {status:?} must be clickable");
                assert_eq!(spec.label, "Try again");
            }
        }
    }

    #[test]
    fn expired_selection_always_wins() {
        for status in VerificationStatus::ALL {
            let spec = cta_with_selection(status, ValidatePaymentStatus::PaymentsExpired);
            assert!(spec.disabled);
            assert_eq!(spec.label, "Refresh payments to continue");
        }
    }

    #[test]
    fn selection_gates_the_initial_cta() {
        let unselected = cta_with_selection(
            VerificationStatus::NotStarted,
            ValidatePaymentStatus::Default,
        );
        assert!(unselected.disabled);

        let selected = cta_with_selection(
            VerificationStatus::NotStarted,
            ValidatePaymentStatus::Valid,
        );
        assert!(!selected.disabled);
        assert_eq!(selected.label, "Verify payment");
    }

    #[test]
    fn prove_step_reflects_proof_outcome() {
        assert_eq!(steps(VerificationStatus::GeneratingProof).prove, StepState::Loading);
        assert_eq!(steps(VerificationStatus::ErrorFailedToProve).prove, StepState::Error);
        assert_eq!(steps(VerificationStatus::TransactionConfigured).prove, StepState::Complete);
    }
}
