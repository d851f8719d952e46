//! Payment selection guard.
//!
//! Applies the metadata freshness window to the user's row selection: a
//! payment must not be selectable if it (or its eventual proof) would
//! lapse before on-chain submission completes. The guard consumes the
//! expiry events produced by the cache tick and gates row clicks.

use crate::core::messages::PaymentCandidate;
use tracing::debug;

/// Tri-state selection validity surfaced to the CTA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatePaymentStatus {
    /// No row clicked yet.
    Default,
    /// The cached list crossed the expiry buffer; refresh required.
    PaymentsExpired,
    /// A row is selected and still fresh.
    Valid,
}

/// Tracks the selected candidate and its validity.
#[derive(Debug, Clone)]
pub struct SelectionGuard {
    status: ValidatePaymentStatus,
    selected: Option<PaymentCandidate>,
}

impl SelectionGuard {
    pub fn new() -> Self {
        Self { status: ValidatePaymentStatus::Default, selected: None }
    }

    pub fn status(&self) -> ValidatePaymentStatus {
        self.status
    }

    pub fn selected(&self) -> Option<&PaymentCandidate> {
        self.selected.as_ref()
    }

    /// A row click. Ignored while expired and for hidden rows; returns
    /// whether the selection was accepted.
    pub fn click_row(&mut self, candidate: PaymentCandidate) -> bool {
        if self.status == ValidatePaymentStatus::PaymentsExpired {
            debug!(
                event = "selection_click_ignored",
                payment_id = %candidate.payment_id,
                "Row click ignored while payments are expired"
            );
            return false;
        }
        if candidate.hidden {
            debug!(
                event = "selection_click_hidden",
                payment_id = %candidate.payment_id,
                "Hidden row is not selectable"
            );
            return false;
        }
        self.selected = Some(candidate);
        self.status = ValidatePaymentStatus::Valid;
        true
    }

    /// The expiry tick crossed the buffer boundary: the selection (if any)
    /// is invalidated until a refresh lands.
    pub fn on_expired(&mut self) {
        self.status = ValidatePaymentStatus::PaymentsExpired;
        self.selected = None;
    }

    /// A fresh metadata push landed. Clears an expired lockout; a live
    /// selection survives background refreshes untouched.
    pub fn on_metadata_refreshed(&mut self) {
        if self.status == ValidatePaymentStatus::PaymentsExpired {
            self.status = ValidatePaymentStatus::Default;
        }
    }

    /// User returned to payment selection.
    pub fn reset(&mut self) {
        self.status = ValidatePaymentStatus::Default;
        self.selected = None;
    }
}

impl Default for SelectionGuard {
    fn default() -> Self {
        Self::new()
    }
}
