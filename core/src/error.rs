//! Error types for the swap engine core.

use crate::complaint::Complaint;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the swap engine core.
///
/// Callers that drive the state machine (the supervisor) care about more
/// than the message: they need to know whether a failure is transient
/// (retry the step) or fatal to the swap (abort and let it expire/refund).
/// [`Error::is_retryable`] draws that line.
#[derive(Error, Debug)]
pub enum Error {
    /// A chain RPC call failed for a reason that is expected to clear up on
    /// retry (connection reset, node temporarily behind, mempool rejection
    /// due to a stale fee estimate, ...).
    #[error("chain RPC error: {0}")]
    Rpc(String),

    /// The rendezvous channel did not produce data before the deadline.
    #[error("rendezvous timeout: {0}")]
    RendezvousTimeout(String),

    /// Data received out-of-band failed on-chain audit. Fatal to the swap.
    #[error("audit failed: {0}")]
    AuditFailed(Complaint),

    /// A locally-built redeem or refund transaction failed script
    /// verification. This is a bug, never broadcast, fatal to the swap.
    #[error("script verification failed: {0}")]
    VerifyFailed(String),

    /// Swap store operation failed.
    #[error("store error: {0}")]
    Store(String),

    /// Swap not found in the store.
    #[error("swap not found: {0}")]
    SwapNotFound(String),

    /// Malformed or unparsable data (address, amount, serialized contract).
    #[error("parse error: {0}")]
    Parse(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Bitcoin script/address construction error.
    #[error("bitcoin error: {0}")]
    Bitcoin(String),

    /// Key derivation error.
    #[error("key derivation error: {0}")]
    KeyDerivation(String),

    /// Refund broadcast failed after expiry. Requires operator intervention.
    #[error("refund failed: {0}")]
    RefundFailed(String),

    /// Generic error with context.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the supervisor should retry the step that produced this
    /// error (leaving status unchanged) rather than aborting the swap.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Rpc(_) | Error::RendezvousTimeout(_))
    }

    /// The typed complaint to emit, if this error should abort the swap.
    pub fn complaint(&self) -> Option<&Complaint> {
        match self {
            Error::AuditFailed(c) => Some(c),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(format!("{:#}", err))
    }
}
