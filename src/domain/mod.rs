//! Domain types shared by every engine component.

pub mod audit;
pub mod transaction;

pub use audit::{AuditAction, AuditEvent};
pub use transaction::{Currency, Payer, PaymentType, Transaction, TransactionState};
