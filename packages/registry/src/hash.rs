//! Content-hash transaction ids
//!
//! Withdrawal-side transactions have no source ledger hash at creation time,
//! so their id is a keccak256 over the transfer parameters. Variable-length
//! fields are hashed into fixed 32-byte words before the final digest, which
//! keeps the encoding unambiguous.

use chrono::{DateTime, Utc};
use tiny_keccak::{Hasher, Keccak};

use crate::types::{AccountId, AssetId};

/// Compute keccak256 of arbitrary data.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Compute the content-hash id for a registry-created transaction.
///
/// Layout: 5 words of 32 bytes:
/// - word 0: keccak256(sender)
/// - word 1: keccak256(asset)
/// - word 2: amount as big-endian u128 in the last 16 bytes
/// - word 3: keccak256(destination)
/// - word 4: unix-millis timestamp as big-endian i64 in the last 8 bytes
pub fn content_id(
    sender: &AccountId,
    asset: &AssetId,
    amount: u128,
    destination: &AccountId,
    timestamp: DateTime<Utc>,
) -> String {
    let mut data = [0u8; 160];

    data[0..32].copy_from_slice(&keccak256(sender.as_str().as_bytes()));
    data[32..64].copy_from_slice(&keccak256(asset.as_str().as_bytes()));
    data[64 + 16..96].copy_from_slice(&amount.to_be_bytes());
    data[96..128].copy_from_slice(&keccak256(destination.as_str().as_bytes()));
    data[128 + 24..160].copy_from_slice(&timestamp.timestamp_millis().to_be_bytes());

    hex::encode(keccak256(&data))
}
