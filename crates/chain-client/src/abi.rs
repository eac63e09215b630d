//! a minimal, hand-rolled Solidity ABI encoder covering exactly the value
//! shapes the pool contract's functions take (spec.md §4.5 dispatch
//! table): `uint256`, `address`, `bytes32`, dynamic `bytes`, and both
//! fixed- and dynamic-length arrays of those. No tuple/struct support is
//! needed because the contract's functions take flat positional arguments.

use crate::types::Address;

/// a single ABI-encodable argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbiValue {
    Uint256([u8; 32]),
    Address(Address),
    Bytes32([u8; 32]),
    Bytes(Vec<u8>),
    /// a fixed-length array (e.g. `bytes32[5]`, `uint256[8]`); static iff
    /// every element is static.
    FixedArray(Vec<AbiValue>),
    /// a dynamic-length array (e.g. `uint256[]`); always dynamic.
    DynArray(Vec<AbiValue>),
}

impl AbiValue {
    pub fn uint256_from_u128(v: u128) -> Self {
        let mut buf = [0u8; 32];
        buf[16..].copy_from_slice(&v.to_be_bytes());
        AbiValue::Uint256(buf)
    }

    fn is_dynamic(&self) -> bool {
        match self {
            AbiValue::Uint256(_) | AbiValue::Address(_) | AbiValue::Bytes32(_) => false,
            AbiValue::Bytes(_) | AbiValue::DynArray(_) => true,
            AbiValue::FixedArray(items) => items.iter().any(AbiValue::is_dynamic),
        }
    }

    /// byte width of a static value's inline head encoding.
    fn static_size(&self) -> usize {
        match self {
            AbiValue::Uint256(_) | AbiValue::Address(_) | AbiValue::Bytes32(_) => 32,
            AbiValue::FixedArray(items) => items.iter().map(AbiValue::static_size).sum(),
            AbiValue::Bytes(_) | AbiValue::DynArray(_) => {
                unreachable!("static_size called on a dynamic value")
            }
        }
    }

    fn encode_static_into(&self, out: &mut Vec<u8>) {
        match self {
            AbiValue::Uint256(b) | AbiValue::Bytes32(b) => out.extend_from_slice(b),
            AbiValue::Address(a) => {
                out.extend_from_slice(&[0u8; 12]);
                out.extend_from_slice(&a.0);
            }
            AbiValue::FixedArray(items) => {
                for item in items {
                    item.encode_static_into(out);
                }
            }
            AbiValue::Bytes(_) | AbiValue::DynArray(_) => {
                unreachable!("encode_static_into called on a dynamic value")
            }
        }
    }

    fn encode_tail(&self) -> Vec<u8> {
        match self {
            AbiValue::Bytes(data) => {
                let mut out = word_from_u64(data.len() as u64).to_vec();
                out.extend_from_slice(data);
                pad_to_word(&mut out);
                out
            }
            AbiValue::DynArray(items) => {
                let mut out = word_from_u64(items.len() as u64).to_vec();
                out.extend_from_slice(&encode_list(items));
                out
            }
            _ => unreachable!("encode_tail called on a static value"),
        }
    }
}

fn word_from_u64(n: u64) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[24..].copy_from_slice(&n.to_be_bytes());
    buf
}

fn pad_to_word(buf: &mut Vec<u8>) {
    let rem = buf.len() % 32;
    if rem != 0 {
        buf.extend(std::iter::repeat(0u8).take(32 - rem));
    }
}

/// the standard ABI head/tail encoding for a flat list of values — used
/// both for a function's top-level arguments and for the elements of a
/// dynamic array.
fn encode_list(values: &[AbiValue]) -> Vec<u8> {
    let head_size: usize = values
        .iter()
        .map(|v| if v.is_dynamic() { 32 } else { v.static_size() })
        .sum();

    let mut head = Vec::with_capacity(head_size);
    let mut tail = Vec::new();

    for v in values {
        if v.is_dynamic() {
            let offset = head_size + tail.len();
            head.extend_from_slice(&word_from_u64(offset as u64));
            tail.extend(v.encode_tail());
        } else {
            v.encode_static_into(&mut head);
        }
    }

    head.extend(tail);
    head
}

/// the 4-byte selector for a canonical function or error signature, e.g.
/// `"unshieldNative(uint256[8],bytes32,bytes32,address,uint256,bytes32,address,uint256)"`.
pub fn selector(signature: &str) -> [u8; 4] {
    use sha3::{Digest, Keccak256};
    let mut hasher = Keccak256::new();
    hasher.update(signature.as_bytes());
    let digest = hasher.finalize();
    [digest[0], digest[1], digest[2], digest[3]]
}

/// full call data: 4-byte selector followed by ABI-encoded arguments.
pub fn encode_call(signature: &str, args: &[AbiValue]) -> Vec<u8> {
    let mut out = selector(signature).to_vec();
    out.extend(encode_list(args));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_is_first_four_bytes_of_keccak() {
        // transfer(address,uint256) is the well-known ERC20 selector 0xa9059cbb.
        let s = selector("transfer(address,uint256)");
        assert_eq!(s, [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn static_only_call_has_no_tail() {
        let data = encode_call(
            "f(uint256,address)",
            &[
                AbiValue::uint256_from_u128(42),
                AbiValue::Address(Address::NATIVE),
            ],
        );
        // 4 (selector) + 2*32 (two static words), no offsets or tail.
        assert_eq!(data.len(), 4 + 64);
    }

    #[test]
    fn dynamic_bytes_arg_is_offset_and_appended() {
        let data = encode_call("f(bytes)", &[AbiValue::Bytes(vec![1, 2, 3])]);
        // 4 selector + 32 offset + 32 length + 32 padded data.
        assert_eq!(data.len(), 4 + 32 + 32 + 32);
        let offset = u64::from_be_bytes(data[4 + 24..4 + 32].try_into().unwrap());
        assert_eq!(offset, 32);
    }

    #[test]
    fn dynamic_array_of_static_elements_roundtrips_length() {
        let arr = AbiValue::DynArray(vec![
            AbiValue::uint256_from_u128(1),
            AbiValue::uint256_from_u128(2),
        ]);
        let data = encode_call("f(uint256[])", &[arr]);
        // offset word, then in the tail: length word (=2) then 2 elements.
        let tail_start = 4 + 32;
        let len = u64::from_be_bytes(data[tail_start + 24..tail_start + 32].try_into().unwrap());
        assert_eq!(len, 2);
    }

    #[test]
    fn fixed_array_of_static_elements_is_inlined() {
        let arr = AbiValue::FixedArray(vec![
            AbiValue::Bytes32([1u8; 32]),
            AbiValue::Bytes32([2u8; 32]),
        ]);
        let data = encode_call("f(bytes32[2])", &[arr]);
        // no offset word: 4 selector + 2*32 inlined.
        assert_eq!(data.len(), 4 + 64);
    }
}
