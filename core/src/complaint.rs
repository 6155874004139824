//! Typed complaints raised by the state machine on rendezvous timeout or
//! audit mismatch.

use serde::{Deserialize, Serialize};

/// A complaint the state machine raises when it cannot proceed safely.
///
/// Complaints are not errors in the "something is broken" sense: they are
/// the typed vocabulary the protocol uses to describe *why* a swap is
/// stuck, so an operator or monitoring system can tell a slow counterparty
/// apart from a malicious one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Complaint {
    /// The responder never saw the requestor publish their contract before
    /// the rendezvous deadline.
    DelayedRequestorInitiation,
    /// The requestor never saw the responder publish their contract before
    /// the rendezvous deadline.
    DelayedResponderInitiation,
    /// The responder funded their HTLC but the requestor never redeemed it
    /// before the deadline, so the secret was never observed on-chain.
    DelayedRequestorRedemption,
    /// The responder's published contract does not match what the
    /// requestor expects (wrong recipient, wrong value, wrong hash lock, or
    /// already expired).
    WrongResponderInitiation(String),
    /// The requestor's published contract does not match what the
    /// responder expects.
    WrongRequestorInitiation(String),
}

impl std::fmt::Display for Complaint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Complaint::DelayedRequestorInitiation => {
                write!(f, "delayed requestor initiation")
            }
            Complaint::DelayedResponderInitiation => {
                write!(f, "delayed responder initiation")
            }
            Complaint::DelayedRequestorRedemption => {
                write!(f, "delayed requestor redemption")
            }
            Complaint::WrongResponderInitiation(reason) => {
                write!(f, "wrong responder initiation: {reason}")
            }
            Complaint::WrongRequestorInitiation(reason) => {
                write!(f, "wrong requestor initiation: {reason}")
            }
        }
    }
}
