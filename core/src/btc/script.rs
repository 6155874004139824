//! HTLC redeem-script construction and inspection for the BTC side of a
//! swap, grounded on
//! `adapters/btc/btc_bindings.go`'s `atomicSwapContract` /
//! `ExtractAtomicSwapDataPushes`.

use crate::error::{Error, Result};
use bitcoin::blockdata::opcodes::all::*;
use bitcoin::blockdata::script::{Builder, Script, ScriptBuf};
use bitcoin::hashes::Hash;
use bitcoin::PubkeyHash;

/// Data pushes recoverable from a well-formed atomic swap redeem script,
/// mirroring the Go original's `ExtractAtomicSwapDataPushes` return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomicSwapDataPushes {
    pub recipient_hash160: [u8; 20],
    pub refund_hash160: [u8; 20],
    pub secret_hash: [u8; 32],
    pub lock_time: i64,
}

/// Build the HTLC redeem script:
///
/// ```text
/// OP_IF
///     OP_SIZE 32 OP_EQUALVERIFY
///     OP_SHA256 <secret_hash> OP_EQUALVERIFY
///     OP_DUP OP_HASH160 <recipient_hash160>
/// OP_ELSE
///     <locktime> OP_CHECKLOCKTIMEVERIFY OP_DROP
///     OP_DUP OP_HASH160 <refund_hash160>
/// OP_ENDIF
/// OP_EQUALVERIFY
/// OP_CHECKSIG
/// ```
///
/// `recipient_hash160` redeems with the secret; `refund_hash160` reclaims
/// after `locktime`.
pub fn atomic_swap_contract(
    refund_hash160: &PubkeyHash,
    recipient_hash160: &PubkeyHash,
    locktime: i64,
    secret_hash: &[u8; 32],
) -> ScriptBuf {
    Builder::new()
        .push_opcode(OP_IF)
        .push_opcode(OP_SIZE)
        .push_int(32)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_SHA256)
        .push_slice(secret_hash)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(recipient_hash160.to_byte_array())
        .push_opcode(OP_ELSE)
        .push_int(locktime)
        .push_opcode(OP_CLTV)
        .push_opcode(OP_DROP)
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(refund_hash160.to_byte_array())
        .push_opcode(OP_ENDIF)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .into_script()
}

/// Build the redeeming scriptSig: `<sig> <pubkey> <secret> <1> <contract>`.
pub fn redeem_p2sh_contract(contract: &Script, sig: &[u8], pubkey: &[u8], secret: &[u8; 32]) -> ScriptBuf {
    Builder::new()
        .push_slice(<&bitcoin::script::PushBytes>::try_from(sig).expect("signature fits push bytes"))
        .push_slice(<&bitcoin::script::PushBytes>::try_from(pubkey).expect("pubkey fits push bytes"))
        .push_slice(secret)
        .push_int(1)
        .push_slice(contract.as_bytes())
        .into_script()
}

/// Build the refunding scriptSig: `<sig> <pubkey> <0> <contract>`.
pub fn refund_p2sh_contract(contract: &Script, sig: &[u8], pubkey: &[u8]) -> ScriptBuf {
    Builder::new()
        .push_slice(<&bitcoin::script::PushBytes>::try_from(sig).expect("signature fits push bytes"))
        .push_slice(<&bitcoin::script::PushBytes>::try_from(pubkey).expect("pubkey fits push bytes"))
        .push_int(0)
        .push_slice(contract.as_bytes())
        .into_script()
}

/// Parse a redeem script built by [`atomic_swap_contract`] back into its
/// data pushes. Returns `None` if the script does not match the expected
/// shape, the same contract the Go original rejects with a nil
/// `*PushedData`.
pub fn extract_atomic_swap_data_pushes(script: &Script) -> Option<AtomicSwapDataPushes> {
    let ins = script.instructions().collect::<std::result::Result<Vec<_>, _>>().ok()?;
    // Expected instruction shape, positionally, matching atomic_swap_contract above.
    use bitcoin::blockdata::script::Instruction::*;
    let get_push = |ins: &bitcoin::blockdata::script::Instruction| -> Option<Vec<u8>> {
        match ins {
            PushBytes(b) => Some(b.as_bytes().to_vec()),
            _ => None,
        }
    };

    if ins.len() < 17 {
        return None;
    }
    if ins[0] != Op(OP_IF) {
        return None;
    }
    if ins[1] != Op(OP_SIZE) {
        return None;
    }
    let size_push = get_push(&ins[2])?;
    if script_num_to_i64(&size_push) != 32 {
        return None;
    }
    if ins[3] != Op(OP_EQUALVERIFY) {
        return None;
    }
    if ins[4] != Op(OP_SHA256) {
        return None;
    }
    let secret_hash_push = get_push(&ins[5])?;
    if secret_hash_push.len() != 32 {
        return None;
    }
    if ins[6] != Op(OP_EQUALVERIFY) || ins[7] != Op(OP_DUP) || ins[8] != Op(OP_HASH160) {
        return None;
    }
    let recipient_push = get_push(&ins[9])?;
    if recipient_push.len() != 20 {
        return None;
    }
    if ins[10] != Op(OP_ELSE) {
        return None;
    }
    let locktime_push = get_push(&ins[11])?;
    if ins[12] != Op(OP_CLTV) || ins[13] != Op(OP_DROP) || ins[14] != Op(OP_DUP) || ins[15] != Op(OP_HASH160) {
        return None;
    }
    let refund_push = get_push(&ins[16])?;
    if refund_push.len() != 20 {
        return None;
    }

    let mut recipient_hash160 = [0u8; 20];
    recipient_hash160.copy_from_slice(&recipient_push);
    let mut refund_hash160 = [0u8; 20];
    refund_hash160.copy_from_slice(&refund_push);
    let mut secret_hash = [0u8; 32];
    secret_hash.copy_from_slice(&secret_hash_push);

    let lock_time = script_num_to_i64(&locktime_push);

    Some(AtomicSwapDataPushes {
        recipient_hash160,
        refund_hash160,
        secret_hash,
        lock_time,
    })
}

/// Minimal little-endian CScriptNum decode, sufficient for the small
/// locktime values this contract pushes.
fn script_num_to_i64(bytes: &[u8]) -> i64 {
    if bytes.is_empty() {
        return 0;
    }
    let mut result: i64 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        result |= (*byte as i64) << (8 * i);
    }
    if bytes.last().copied().unwrap_or(0) & 0x80 != 0 {
        result &= !(0x80i64 << (8 * (bytes.len() - 1)));
        result = -result;
    }
    result
}

/// Verify a spending transaction's scriptSig against the P2SH contract
/// output it consumes, using the bundled bitcoinconsensus-backed libbitcoin
/// script interpreter — the same local check the Go original performs with
/// `txscript.NewEngine(...).Execute()` before ever broadcasting.
pub fn verify_spend(
    spending_tx: &bitcoin::Transaction,
    input_index: usize,
    prevout_script_pubkey: &Script,
    prevout_value: bitcoin::Amount,
) -> Result<()> {
    prevout_script_pubkey
        .verify(
            input_index,
            prevout_value,
            bitcoin::consensus::encode::serialize(spending_tx).as_slice(),
        )
        .map_err(|e| Error::VerifyFailed(format!("{e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::hash160;

    fn dummy_hash(byte: u8) -> PubkeyHash {
        PubkeyHash::from_raw_hash(hash160::Hash::from_byte_array([byte; 20]))
    }

    #[test]
    fn round_trips_through_extract() {
        let refund_pkh = dummy_hash(0xAA);
        let recipient_pkh = dummy_hash(0xBB);
        let secret_hash = [0x42u8; 32];
        let locktime = 1_700_000_000i64;

        let script = atomic_swap_contract(&refund_pkh, &recipient_pkh, locktime, &secret_hash);
        let pushes = extract_atomic_swap_data_pushes(&script).expect("script should parse");

        assert_eq!(pushes.secret_hash, secret_hash);
        assert_eq!(pushes.recipient_hash160, recipient_pkh.to_byte_array());
        assert_eq!(pushes.refund_hash160, refund_pkh.to_byte_array());
        assert_eq!(pushes.lock_time, locktime);
    }

    #[test]
    fn rejects_arbitrary_script() {
        let script = Builder::new().push_opcode(OP_RETURN).into_script();
        assert!(extract_atomic_swap_data_pushes(&script).is_none());
    }
}
