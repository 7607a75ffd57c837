//! Startup checks for configured payment addresses.
//!
//! A ticket or pool address is base58 text over
//! `net_id (2) || hash160 (20) || checksum (4)`. Only pay-to-pubkey-hash and
//! pay-to-script-hash addresses can receive voting rights or pool fees, so
//! those are the only network ids accepted.

use thiserror::Error;

use crate::config::Network;

/// Decoded length of a hash address.
const HASH_ADDRESS_LEN: usize = 2 + 20 + 4;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AddressError {
    #[error("not valid base58: {0}")]
    Encoding(#[from] bs58::decode::Error),

    #[error("decoded to {0} bytes, expected 26")]
    Length(usize),

    #[error("network id {id:02x?} is not a {network:?} hash address")]
    WrongNetwork { id: [u8; 2], network: Network },
}

impl Network {
    /// Network ids of the hash address kinds: pubkey hash, then script hash.
    pub fn hash_address_ids(self) -> [[u8; 2]; 2] {
        match self {
            Network::Mainnet => [[0x07, 0x3f], [0x07, 0x1a]],
            Network::Testnet => [[0x0f, 0x21], [0x0e, 0xfc]],
            Network::Simnet => [[0x0e, 0x91], [0x0e, 0x6c]],
        }
    }
}

/// Checks that `address` decodes to a hash address of `network`.
///
/// The checksum is not verified; the wallet does that on submission.
pub fn check_address(address: &str, network: Network) -> Result<(), AddressError> {
    let raw = bs58::decode(address.trim()).into_vec()?;

    if raw.len() != HASH_ADDRESS_LEN {
        return Err(AddressError::Length(raw.len()));
    }

    let id = [raw[0], raw[1]];
    if !network.hash_address_ids().contains(&id) {
        return Err(AddressError::WrongNetwork { id, network });
    }

    Ok(())
}
