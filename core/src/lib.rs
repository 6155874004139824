//! swapperd-core: cross-chain atomic swap engine.
//!
//! Platform-agnostic protocol library implementing hash-timelocked
//! contract swaps between a Bitcoin-like UTXO chain and an Ethereum-like
//! account chain. This crate has no network or filesystem I/O of its own;
//! chain access, persistence, and out-of-band delivery are all abstracted
//! through traits the host binary implements.

pub mod atom;
pub mod btc;
pub mod complaint;
pub mod error;
pub mod eth;
pub mod keys;
pub mod rendezvous;
pub mod state_machine;
pub mod store;
pub mod types;

pub use atom::{Atom, BtcAtom, Chain, EthAtom};
pub use complaint::Complaint;
pub use error::{Error, Result};
pub use rendezvous::RendezvousChannel;
pub use state_machine::{Swap, StepOutcome};
pub use store::SwapStore;
pub use types::{
    AtomContractDetails, InitiateDetails, Network, RedeemDetails, StatusCode, StatusUpdate, StepStatus, SwapBlob, SwapID,
    SwapReceipt, Token,
};
