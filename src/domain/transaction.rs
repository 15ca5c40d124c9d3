//! The central `Transaction` entity and its state machine.
//!
//! A closed enum with an explicit `can_transition_to` guard, plus a row of
//! metadata that rides along with the state but isn't itself part of the
//! state machine.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The transaction lifecycle states (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Pending,
    Initialized,
    Paid,
    Completed,
    PayoutFailed,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Pending => "pending",
            TransactionState::Initialized => "initialized",
            TransactionState::Paid => "paid",
            TransactionState::Completed => "completed",
            TransactionState::PayoutFailed => "payout_failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransactionState::Pending),
            "initialized" => Some(TransactionState::Initialized),
            "paid" => Some(TransactionState::Paid),
            "completed" => Some(TransactionState::Completed),
            "payout_failed" => Some(TransactionState::PayoutFailed),
            _ => None,
        }
    }

    /// Validates a state transition (§4.2). Same-state assignments are
    /// accepted as no-ops. `Pending -> Paid` is the engine's own
    /// confirmation edge (§4.5 guards the CAS on `state = Pending`, not
    /// `Initialized` — see DESIGN.md for the reasoning).
    pub fn can_transition_to(&self, next: &TransactionState) -> bool {
        use TransactionState::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Pending, Initialized)
                | (Initialized, Paid)
                | (Pending, Paid)
                | (Paid, Completed)
                | (Paid, PayoutFailed)
                | (PayoutFailed, Completed)
                | (Pending, PayoutFailed)
        )
    }
}

/// Opaque currency tag, echoed to the provider and webhook but never
/// interpreted by the engine (§1 non-goals: no multi-currency reconciliation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    NGN,
    USD,
    GBP,
    EUR,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::NGN => "NGN",
            Currency::USD => "USD",
            Currency::GBP => "GBP",
            Currency::EUR => "EUR",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "NGN" => Some(Currency::NGN),
            "USD" => Some(Currency::USD),
            "GBP" => Some(Currency::GBP),
            "EUR" => Some(Currency::EUR),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Bank,
    Card,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Bank => "bank",
            PaymentType::Card => "card",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "bank" => Some(PaymentType::Bank),
            "card" => Some(PaymentType::Card),
            _ => None,
        }
    }
}

/// Sender-supplied contact details, patched in by `StartVerification`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// The central entity driven through §4.2's state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub reference: String,
    pub payment_link_id: Uuid,
    pub state: TransactionState,
    pub amount: BigDecimal,
    pub currency: Currency,
    pub provider_ref: Option<String>,
    pub payment_type: Option<PaymentType>,
    pub payer: Payer,
    pub success_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub verification_started_at: Option<DateTime<Utc>>,
    pub last_verification_check: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub processing_owner: Option<String>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub actual_amount_paid: Option<BigDecimal>,
}

impl Transaction {
    /// True for states that are quiescent and own no lease: completed and
    /// payout-failed rows never run through the pollers again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            TransactionState::Completed | TransactionState::PayoutFailed
        )
    }

    pub fn lease_is_held_by(&self, owner: &str) -> bool {
        self.processing_owner.as_deref() == Some(owner)
    }

    pub fn lease_is_stale(&self, now: DateTime<Utc>, stale_after: chrono::Duration) -> bool {
        match self.processing_started_at {
            Some(started) => now - started >= stale_after,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_matches_i3() {
        use TransactionState::*;

        assert!(Pending.can_transition_to(&Initialized));
        assert!(Initialized.can_transition_to(&Paid));
        assert!(Pending.can_transition_to(&Paid));
        assert!(Paid.can_transition_to(&Completed));
        assert!(Paid.can_transition_to(&PayoutFailed));
        assert!(PayoutFailed.can_transition_to(&Completed));
        assert!(Pending.can_transition_to(&PayoutFailed));

        // same-state is a no-op, accepted
        assert!(Pending.can_transition_to(&Pending));
        assert!(Completed.can_transition_to(&Completed));

        // everything else is rejected
        assert!(!Pending.can_transition_to(&Completed));
        assert!(!Completed.can_transition_to(&PayoutFailed));
        assert!(!PayoutFailed.can_transition_to(&Pending));
        assert!(!Initialized.can_transition_to(&PayoutFailed));
    }

    #[test]
    fn state_string_round_trip() {
        for state in [
            TransactionState::Pending,
            TransactionState::Initialized,
            TransactionState::Paid,
            TransactionState::Completed,
            TransactionState::PayoutFailed,
        ] {
            assert_eq!(TransactionState::from_str(state.as_str()), Some(state));
        }
        assert_eq!(TransactionState::from_str("bogus"), None);
    }

    #[test]
    fn currency_is_case_insensitive() {
        assert_eq!(Currency::from_str("usd"), Some(Currency::USD));
        assert_eq!(Currency::from_str("NGN"), Some(Currency::NGN));
        assert_eq!(Currency::from_str("xyz"), None);
    }
}
