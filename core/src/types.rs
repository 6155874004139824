//! Shared data model for the swap engine core.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::{SystemTime, UNIX_EPOCH};

/// Serde module for serializing `[u8; 32]` as hex strings.
pub(crate) mod hex_bytes32 {
    use super::*;

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }

    /// Same, for the `Option<[u8; 32]>` case (responder-only fields).
    pub(crate) mod option {
        use super::*;

        pub fn serialize<S>(bytes: &Option<[u8; 32]>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match bytes {
                Some(b) => serializer.serialize_some(&hex::encode(b)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<[u8; 32]>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s: Option<String> = Option::deserialize(deserializer)?;
            match s {
                Some(s) => {
                    let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
                    let bytes: [u8; 32] = bytes
                        .try_into()
                        .map_err(|_| serde::de::Error::custom("expected 32 bytes"))?;
                    Ok(Some(bytes))
                }
                None => Ok(None),
            }
        }
    }
}

/// Bitcoin network type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Bitcoin mainnet.
    Bitcoin,
    /// Bitcoin testnet.
    Testnet,
    /// Bitcoin regtest (local development).
    Regtest,
}

impl Network {
    /// Convert to bitcoin crate's Network type.
    pub fn to_bitcoin_network(self) -> bitcoin::Network {
        match self {
            Network::Bitcoin => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
            Network::Regtest => bitcoin::Network::Regtest,
        }
    }
}

impl std::str::FromStr for Network {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bitcoin" | "mainnet" => Ok(Network::Bitcoin),
            "testnet" | "testnet3" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            _ => Err(crate::error::Error::Parse(format!("unknown network: {s}"))),
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Bitcoin => write!(f, "bitcoin"),
            Network::Testnet => write!(f, "testnet"),
            Network::Regtest => write!(f, "regtest"),
        }
    }
}

/// Opaque 32-byte swap identifier, externally represented as base64
/// Displayed as base64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwapID(pub [u8; 32]);

impl SwapID {
    /// Generate a fresh random swap id from the OS CSPRNG.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        SwapID(bytes)
    }

    /// The deterministic log color class for this swap, `id[0] mod 6`.
    pub fn color_class(&self) -> u8 {
        self.0[0] % 6
    }
}

impl std::fmt::Display for SwapID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use base64::Engine;
        write!(f, "{}", base64::engine::general_purpose::STANDARD.encode(self.0))
    }
}

impl std::str::FromStr for SwapID {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(|e| crate::error::Error::Parse(format!("invalid swap id: {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| crate::error::Error::Parse("swap id must be 32 bytes".into()))?;
        Ok(SwapID(bytes))
    }
}

impl Serialize for SwapID {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SwapID {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The asset traded on either side of a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Token {
    Btc,
    Eth,
    Wbtc,
}

/// Closed, monotonic status set, externally visible on a swap receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum StatusCode {
    Inactive = 0,
    Initiated = 1,
    Audited = 2,
    AuditPending = 3,
    AuditFailed = 4,
    Redeemed = 5,
    AuditedSecret = 6,
    Refunded = 7,
    RefundFailed = 8,
    Cancelled = 9,
    Expired = 10,
}

impl StatusCode {
    /// Whether this status is a final resting state for the swap: once
    /// reached, the supervisor drops its task and no further steps run.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            StatusCode::Redeemed
                | StatusCode::Refunded
                | StatusCode::Cancelled
                | StatusCode::Expired
        )
    }
}

/// Fine-grained step cursor persisted per swap. `StatusCode` above is the
/// coarse, externally-visible status; `StepStatus` additionally
/// distinguishes the sub-steps within `Initiated`/`Audited` that the
/// requestor and responder step tables need to resume correctly. The two
/// values are kept in sync by `state_machine::Swap`:
/// every `StepStatus` maps onto exactly one `StatusCode` via
/// [`StepStatus::status_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StepStatus {
    #[default]
    Inactive,
    InitiateDetailsAcquired,
    Initiated,
    SentSwapDetails,
    ReceivedSwapDetails,
    Audited,
    RedeemDetailsAcquired,
    Redeemed,
    Refunded,
    RefundFailed,
    Cancelled,
    Expired,
}

impl StepStatus {
    /// Project this fine-grained step cursor onto the coarse externally
    /// visible `StatusCode`.
    pub const fn status_code(self) -> StatusCode {
        match self {
            StepStatus::Inactive => StatusCode::Inactive,
            StepStatus::InitiateDetailsAcquired => StatusCode::Inactive,
            StepStatus::Initiated => StatusCode::Initiated,
            StepStatus::SentSwapDetails => StatusCode::Initiated,
            StepStatus::ReceivedSwapDetails => StatusCode::AuditPending,
            StepStatus::Audited => StatusCode::Audited,
            StepStatus::RedeemDetailsAcquired => StatusCode::AuditedSecret,
            StepStatus::Redeemed => StatusCode::Redeemed,
            StepStatus::Refunded => StatusCode::Refunded,
            StepStatus::RefundFailed => StatusCode::RefundFailed,
            StepStatus::Cancelled => StatusCode::Cancelled,
            StepStatus::Expired => StatusCode::Expired,
        }
    }

    pub const fn is_terminal(self) -> bool {
        self.status_code().is_terminal()
    }
}

/// Pending-swap record, provided by the request layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapBlob {
    pub id: SwapID,
    pub send_token: Token,
    pub receive_token: Token,
    /// Decimal integer string, e.g. `"100000"` sats or wei.
    pub send_amount: String,
    pub receive_amount: String,
    pub send_to: String,
    pub receive_from: String,
    /// Present for responder; absent for requestor (generated locally).
    #[serde(with = "hex_bytes32::option", default)]
    pub secret_hash: Option<[u8; 32]>,
    /// Absolute expiry of the *counterparty* contract; responder only.
    pub time_lock: Option<i64>,
    /// `true` iff this party is the requestor.
    pub should_initiate_first: bool,
    /// Used once to derive keys; never persisted.
    #[serde(skip_serializing)]
    pub password: String,

    /// Fine-grained step cursor; engine-maintained,
    /// absent on the wire request that creates a swap.
    #[serde(default)]
    pub step: StepStatus,
    /// The redeem secret, once drawn (requestor) or learned (responder).
    #[serde(with = "hex_bytes32::option", default)]
    pub secret: Option<[u8; 32]>,
    /// This party's own published contract, once `Initiate` has run.
    #[serde(default)]
    pub personal_contract: Option<AtomContractDetails>,
    /// The counterparty's published contract, once received and audited.
    #[serde(default)]
    pub foreign_contract: Option<AtomContractDetails>,
    /// This party's own HTLC expiry, set by `GenerateDetails` (requestor)
    /// or derived in `ResponderAudit` (responder).
    #[serde(default)]
    pub expiry: Option<i64>,
}

/// Per-swap visible record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapReceipt {
    pub id: SwapID,
    pub send_token: Token,
    pub receive_token: Token,
    pub send_amount: String,
    pub receive_amount: String,
    pub status: StatusCode,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SwapReceipt {
    pub fn new(blob: &SwapBlob, now: i64) -> Self {
        Self {
            id: blob.id,
            send_token: blob.send_token,
            receive_token: blob.receive_token,
            send_amount: blob.send_amount.clone(),
            receive_amount: blob.receive_amount.clone(),
            status: StatusCode::Inactive,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: StatusCode, now: i64) -> Self {
        self.status = status;
        self.updated_at = now;
        self
    }
}

/// The update the supervisor broadcasts after every persisted status
/// transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub id: SwapID,
    pub code: StatusCode,
}

/// `(expiry, secretHash)` pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InitiateDetails {
    pub expiry: i64,
    #[serde(with = "hex_bytes32")]
    pub secret_hash: [u8; 32],
}

/// The redeem secret, known to the requestor from generation and to the
/// responder only after observing the requestor's redeeming spend
/// "RedeemDetails").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RedeemDetails {
    #[serde(with = "hex_bytes32")]
    pub secret: [u8; 32],
}

/// Per-chain contract details serialized as opaque bytes in the store
/// Tagged by chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AtomContractDetails {
    Btc {
        contract_script: Vec<u8>,
        contract_address: String,
        contract_tx: Vec<u8>,
        refund_tx: Vec<u8>,
        txid: String,
    },
    Eth {
        order_id: [u8; 32],
        sender_address: String,
    },
}

/// Current wall-clock time, in unix seconds.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_secs() as i64
}
