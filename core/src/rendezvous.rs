//! Best-effort out-of-band delivery channel keyed by swap id.
//! The channel need not authenticate payloads: the state machine audits
//! everything it receives against on-chain truth before acting on it.

use crate::error::{Error, Result};
use crate::types::SwapID;
use async_trait::async_trait;

/// A rendezvous channel implementation. Receive calls block until data is
/// available or `deadline` passes, at which point they must fail with
/// [`Error::RendezvousTimeout`].
#[async_trait]
pub trait RendezvousChannel: Send + Sync {
    /// Posts to the requestor's or responder's slot depending on
    /// `from_requestor`, the same direction-keying [`send_swap_details`]
    /// uses, so the two parties' addresses never collide on a channel
    /// keyed only by swap id.
    ///
    /// [`send_swap_details`]: RendezvousChannel::send_swap_details
    async fn send_owner_address(&self, id: SwapID, from_requestor: bool, addr: &str) -> Result<()>;

    /// `deadline` is an absolute unix timestamp. `from_requestor` selects
    /// whose slot to read; a caller always reads the slot opposite its own
    /// role.
    async fn receive_owner_address(&self, id: SwapID, from_requestor: bool, deadline: i64) -> Result<String>;

    /// Posts to the requestor's or responder's slot depending on
    /// `from_requestor`, so the two parties' messages never collide on a
    /// channel that is keyed only by swap id.
    async fn send_swap_details(&self, id: SwapID, from_requestor: bool, bytes: &[u8]) -> Result<()>;

    /// `deadline` is an absolute unix timestamp. `from_requestor` selects
    /// whose slot to read; a caller always reads the slot opposite its own
    /// role.
    async fn receive_swap_details(&self, id: SwapID, from_requestor: bool, deadline: i64) -> Result<Vec<u8>>;
}

/// Helper used by both channel implementations and tests: converts a
/// missing-deadline poll loop into a typed timeout error.
pub(crate) fn timeout_error(what: &str) -> Error {
    Error::RendezvousTimeout(what.to_string())
}
