//! legacy (EIP-155) transaction signing for the relayer's own EOA. The
//! pool contracts take flat positional calldata with no payable value, so
//! only the legacy envelope is needed — no access lists, no EIP-1559 fee
//! fields. RLP encoding is hand-rolled in the same spirit as
//! `chain_client::abi`'s hand-rolled ABI encoder: the shapes needed here
//! are few and fixed.

use sha3::{Digest, Keccak256};

use chain_client::Address;

use crate::error::{RelayError, Result};

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn rlp_encode_bytes(data: &[u8]) -> Vec<u8> {
    if data.len() == 1 && data[0] < 0x80 {
        return data.to_vec();
    }
    let mut out = Vec::with_capacity(data.len() + 9);
    if data.len() < 56 {
        out.push(0x80 + data.len() as u8);
    } else {
        let len_bytes = be_trimmed(data.len() as u64);
        out.push(0xb7 + len_bytes.len() as u8);
        out.extend_from_slice(&len_bytes);
    }
    out.extend_from_slice(data);
    out
}

fn rlp_encode_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload_len: usize = items.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(payload_len + 9);
    if payload_len < 56 {
        out.push(0xc0 + payload_len as u8);
    } else {
        let len_bytes = be_trimmed(payload_len as u64);
        out.push(0xf7 + len_bytes.len() as u8);
        out.extend_from_slice(&len_bytes);
    }
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

fn be_trimmed(n: u64) -> Vec<u8> {
    let be = n.to_be_bytes();
    let first_nonzero = be.iter().position(|&b| b != 0);
    match first_nonzero {
        Some(i) => be[i..].to_vec(),
        None => vec![],
    }
}

fn rlp_encode_u64(n: u64) -> Vec<u8> {
    rlp_encode_bytes(&be_trimmed(n))
}

fn rlp_encode_u128(n: u128) -> Vec<u8> {
    let be = n.to_be_bytes();
    let first_nonzero = be.iter().position(|&b| b != 0);
    match first_nonzero {
        Some(i) => rlp_encode_bytes(&be[i..]),
        None => rlp_encode_bytes(&[]),
    }
}

/// the fields of a legacy, single-`to` contract call; `value` is always
/// zero for the pool's write functions.
#[derive(Clone, Debug)]
pub struct UnsignedTx {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl UnsignedTx {
    fn rlp_fields(&self, v: u64, r: &[u8], s: &[u8]) -> Vec<Vec<u8>> {
        vec![
            rlp_encode_u64(self.nonce),
            rlp_encode_u128(self.gas_price),
            rlp_encode_u64(self.gas_limit),
            rlp_encode_bytes(&self.to.0),
            rlp_encode_u64(0),
            rlp_encode_bytes(&self.data),
            rlp_encode_u64(v),
            rlp_encode_bytes(r),
            rlp_encode_bytes(s),
        ]
    }

    /// the EIP-155 signing hash: `keccak256(rlp([..., chainId, 0, 0]))`.
    fn signing_hash(&self) -> [u8; 32] {
        let fields = self.rlp_fields(self.chain_id, &[], &[]);
        keccak256(&rlp_encode_list(&fields))
    }
}

/// signs `tx` with `private_key` (32 raw bytes) and returns the fully
/// RLP-encoded, signed legacy transaction ready for `eth_sendRawTransaction`.
pub fn sign(tx: &UnsignedTx, private_key: &[u8; 32]) -> Result<Vec<u8>> {
    use secp256k1::ecdsa::RecoverableSignature;
    use secp256k1::{Message, Secp256k1, SecretKey};

    let secp = Secp256k1::signing_only();
    let secret_key = SecretKey::from_slice(private_key)
        .map_err(|e| RelayError::Signing(format!("invalid relayer private key: {e}")))?;

    let hash = tx.signing_hash();
    let message = Message::from_slice(&hash)
        .map_err(|e| RelayError::Signing(format!("invalid signing digest: {e}")))?;

    let sig: RecoverableSignature = secp.sign_ecdsa_recoverable(&message, &secret_key);
    let (recovery_id, compact) = sig.serialize_compact();
    let r = &compact[..32];
    let s = &compact[32..];

    // EIP-155: v = recoveryId + chainId * 2 + 35
    let v = recovery_id.to_i32() as u64 + tx.chain_id * 2 + 35;

    let fields = tx.rlp_fields(v, r, s);
    Ok(rlp_encode_list(&fields))
}

/// derives the relayer's own EVM address from its private key, so startup
/// can log who it's acting as without a separate env var for it.
pub fn address_from_private_key(private_key: &[u8; 32]) -> Result<Address> {
    use secp256k1::{PublicKey, Secp256k1, SecretKey};

    let secp = Secp256k1::signing_only();
    let secret_key = SecretKey::from_slice(private_key)
        .map_err(|e| RelayError::Signing(format!("invalid relayer private key: {e}")))?;
    let public_key = PublicKey::from_secret_key(&secp, &secret_key);
    let uncompressed = public_key.serialize_uncompressed();
    // drop the leading 0x04 prefix, hash the remaining 64 bytes, take the
    // last 20 bytes of the keccak digest (standard EVM address derivation).
    let hash = keccak256(&uncompressed[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    Ok(Address(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rlp_round_trips_known_small_bytes() {
        assert_eq!(rlp_encode_bytes(&[]), vec![0x80]);
        assert_eq!(rlp_encode_bytes(&[0x01]), vec![0x01]);
        assert_eq!(rlp_encode_bytes(&[0x80]), vec![0x81, 0x80]);
    }

    #[test]
    fn rlp_u64_zero_is_empty_string() {
        assert_eq!(rlp_encode_u64(0), vec![0x80]);
    }

    #[test]
    fn signing_is_deterministic_for_same_input() {
        let tx = UnsignedTx {
            nonce: 1,
            gas_price: 1_000_000_000,
            gas_limit: 500_000,
            to: Address([2u8; 20]),
            data: vec![1, 2, 3, 4],
            chain_id: 1,
        };
        let key = [7u8; 32];
        let a = sign(&tx, &key).unwrap();
        let b = sign(&tx, &key).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_keys_sign_differently() {
        let tx = UnsignedTx {
            nonce: 1,
            gas_price: 1_000_000_000,
            gas_limit: 500_000,
            to: Address([2u8; 20]),
            data: vec![1, 2, 3, 4],
            chain_id: 1,
        };
        let a = sign(&tx, &[7u8; 32]).unwrap();
        let b = sign(&tx, &[9u8; 32]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn address_derivation_is_deterministic() {
        let key = [11u8; 32];
        let a = address_from_private_key(&key).unwrap();
        let b = address_from_private_key(&key).unwrap();
        assert_eq!(a, b);
    }
}
