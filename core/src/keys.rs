//! BIP-39/BIP-32 key derivation.
//!
//! Unlike a cached signing index that produces
//! reusable per-swap keys, this module derives a fresh keypair directly from
//! the swap's one-time password and throws away every intermediate value
//! once the keypair is returned: nothing is cached across steps, and the
//! password never leaves this function.

use crate::error::{Error, Result};
use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::key::Secp256k1;
use bitcoin::secp256k1::{PublicKey, SecretKey};
use std::str::FromStr;

/// BIP-44 testnet coin type (applies to both testnet and regtest).
const BTC_TESTNET_PATH: &str = "m/44'/1'/0'/0/0";
/// BIP-44 Bitcoin mainnet coin type.
const BTC_MAINNET_PATH: &str = "m/44'/0'/0'/0/0";
/// BIP-44 Ethereum coin type.
const ETH_PATH: &str = "m/44'/60'/0'/0/0";

/// A derived secp256k1 keypair, used for one side of one HTLC and then
/// dropped.
#[derive(Clone, Copy)]
pub struct SwapKeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

fn derive_at_path(mnemonic: &bip39::Mnemonic, password: &str, network: bitcoin::Network, path: &str) -> Result<SwapKeyPair> {
    let secp = Secp256k1::new();
    let seed = mnemonic.to_seed(password);
    let master = Xpriv::new_master(network, &seed)
        .map_err(|e| Error::KeyDerivation(format!("failed to derive master key: {e}")))?;

    let path = DerivationPath::from_str(path)
        .map_err(|e| Error::KeyDerivation(format!("invalid derivation path {path}: {e}")))?;

    let derived = master
        .derive_priv(&secp, &path)
        .map_err(|e| Error::KeyDerivation(format!("key derivation failed: {e}")))?;

    let secret_key = derived.private_key;
    let public_key = secret_key.public_key(&secp);

    Ok(SwapKeyPair {
        secret_key,
        public_key,
    })
}

/// Derive the BTC-side keypair for this swap's password, on the given
/// network (`m/44'/0'/0'/0/0` mainnet, `m/44'/1'/0'/0/0`
/// testnet/regtest).
pub fn derive_btc_keypair(mnemonic_phrase: &str, password: &str, network: bitcoin::Network) -> Result<SwapKeyPair> {
    let mnemonic = bip39::Mnemonic::from_str(mnemonic_phrase)
        .map_err(|e| Error::KeyDerivation(format!("invalid mnemonic: {e}")))?;

    let path = match network {
        bitcoin::Network::Bitcoin => BTC_MAINNET_PATH,
        _ => BTC_TESTNET_PATH,
    };

    derive_at_path(&mnemonic, password, network, path)
}

/// Derive the ETH-side keypair for this swap's password
/// (`m/44'/60'/0'/0/0`). The network argument only selects the master key
/// derivation network tag; ETH itself has no notion of testnet/mainnet at
/// this layer.
pub fn derive_eth_keypair(mnemonic_phrase: &str, password: &str) -> Result<SwapKeyPair> {
    let mnemonic = bip39::Mnemonic::from_str(mnemonic_phrase)
        .map_err(|e| Error::KeyDerivation(format!("invalid mnemonic: {e}")))?;

    derive_at_path(&mnemonic, password, bitcoin::Network::Bitcoin, ETH_PATH)
}

/// Generate a fresh 24-word mnemonic phrase for provisioning a new wallet.
pub fn generate_mnemonic() -> Result<String> {
    use bip39::{Language, Mnemonic};
    use rand::rngs::OsRng;

    let mnemonic = Mnemonic::generate_in_with(&mut OsRng, Language::English, 24)
        .map_err(|e| Error::KeyDerivation(format!("failed to generate mnemonic: {e}")))?;
    Ok(mnemonic.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn btc_derivation_is_deterministic() {
        let phrase = generate_mnemonic().unwrap();
        let kp1 = derive_btc_keypair(&phrase, "swap-password", bitcoin::Network::Testnet).unwrap();
        let kp2 = derive_btc_keypair(&phrase, "swap-password", bitcoin::Network::Testnet).unwrap();
        assert_eq!(kp1.secret_key.secret_bytes(), kp2.secret_key.secret_bytes());
    }

    #[test]
    fn different_passwords_diverge() {
        let phrase = generate_mnemonic().unwrap();
        let kp1 = derive_btc_keypair(&phrase, "password-a", bitcoin::Network::Testnet).unwrap();
        let kp2 = derive_btc_keypair(&phrase, "password-b", bitcoin::Network::Testnet).unwrap();
        assert_ne!(kp1.secret_key.secret_bytes(), kp2.secret_key.secret_bytes());
    }

    #[test]
    fn btc_and_eth_keys_diverge() {
        let phrase = generate_mnemonic().unwrap();
        let btc = derive_btc_keypair(&phrase, "swap-password", bitcoin::Network::Testnet).unwrap();
        let eth = derive_eth_keypair(&phrase, "swap-password").unwrap();
        assert_ne!(btc.secret_key.secret_bytes(), eth.secret_key.secret_bytes());
    }
}
