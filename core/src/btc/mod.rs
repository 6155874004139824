//! BTC-side HTLC support: script construction/parsing and the contract
//! lifecycle built on top of it.

pub mod contract;
pub mod script;

pub use contract::BtcWalletRpc;
pub use script::AtomicSwapDataPushes;
