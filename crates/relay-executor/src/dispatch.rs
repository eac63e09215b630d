//! operation → on-chain function encoding (SPEC_FULL.md §4.5 "Dispatch").
//! Each `encode_*` produces the full call data — selector plus ABI-encoded
//! positional arguments — for exactly one pool contract function.

use chain_client::abi::{encode_call, AbiValue};
use field_hash::Fr;

use crate::proof::Proof;
use crate::request::{
    BatchTransferRequest, BatchUnshieldRequest, RelayRequest, SwapRequest, TransferMultiRequest,
    TransferRequest, UnshieldRequest,
};

fn proof_arg(proof: &Proof) -> AbiValue {
    AbiValue::FixedArray(proof.as_slice().iter().map(|f| AbiValue::Uint256(f.to_bytes_be())).collect())
}

fn bytes32_arg(fr: Fr) -> AbiValue {
    AbiValue::Bytes32(fr.to_bytes_be())
}

fn fixed_bytes32s(elements: &[Fr]) -> AbiValue {
    AbiValue::FixedArray(elements.iter().map(|f| AbiValue::Bytes32(f.to_bytes_be())).collect())
}

fn dyn_bytes32s(elements: &[Fr]) -> AbiValue {
    AbiValue::DynArray(elements.iter().map(|f| AbiValue::Bytes32(f.to_bytes_be())).collect())
}

fn dyn_uint256s(values: &[u128]) -> AbiValue {
    AbiValue::DynArray(values.iter().copied().map(AbiValue::uint256_from_u128).collect())
}

fn dyn_proofs(proofs: &[Proof]) -> AbiValue {
    AbiValue::DynArray(proofs.iter().map(proof_arg).collect())
}

const SIG_UNSHIELD_NATIVE: &str =
    "unshieldNative(uint256[8],bytes32,bytes32,address,uint256,bytes32,address,uint256)";
const SIG_UNSHIELD_TOKEN: &str =
    "unshieldToken(uint256[8],bytes32,bytes32,address,address,uint256,bytes32,address,uint256)";
const SIG_TRANSFER: &str =
    "transfer(uint256[8],bytes32,bytes32,bytes32,bytes32,address,uint256,bytes,bytes)";
const SIG_TRANSFER_MULTI: &str =
    "transferMulti(uint256[8],bytes32[5],bytes32[5],bytes32,bytes32,address,uint256,uint8,bytes,bytes)";
const SIG_SWAP: &str =
    "swap(uint256[8],bytes32,bytes32,bytes32,bytes32,address,address,uint256,uint256,uint256,bytes)";
const SIG_BATCH_TRANSFER: &str =
    "batchTransfer(uint256[8][],bytes32[],bytes32[],bytes32,bytes32,address,address,uint256,bytes,bytes)";
const SIG_BATCH_UNSHIELD: &str =
    "batchUnshield(uint256[8][],bytes32[],bytes32[],address,address,uint256[],bytes32[],address,uint256)";

fn fee_or_zero(fee: Option<u128>) -> u128 {
    fee.unwrap_or(0)
}

pub fn encode_unshield(r: &UnshieldRequest) -> Vec<u8> {
    if r.token.is_native() {
        encode_call(
            SIG_UNSHIELD_NATIVE,
            &[
                proof_arg(&r.proof),
                bytes32_arg(r.root),
                bytes32_arg(r.nullifier_hash),
                AbiValue::Address(r.recipient),
                AbiValue::uint256_from_u128(r.amount),
                bytes32_arg(r.change_commitment),
                AbiValue::Address(r.relayer),
                AbiValue::uint256_from_u128(fee_or_zero(r.fee)),
            ],
        )
    } else {
        encode_call(
            SIG_UNSHIELD_TOKEN,
            &[
                proof_arg(&r.proof),
                bytes32_arg(r.root),
                bytes32_arg(r.nullifier_hash),
                AbiValue::Address(r.recipient),
                AbiValue::Address(r.token),
                AbiValue::uint256_from_u128(r.amount),
                bytes32_arg(r.change_commitment),
                AbiValue::Address(r.relayer),
                AbiValue::uint256_from_u128(fee_or_zero(r.fee)),
            ],
        )
    }
}

pub fn encode_transfer(r: &TransferRequest) -> Vec<u8> {
    encode_call(
        SIG_TRANSFER,
        &[
            proof_arg(&r.proof),
            bytes32_arg(r.root),
            bytes32_arg(r.nullifier_hash),
            bytes32_arg(r.output_commitment_1),
            bytes32_arg(r.output_commitment_2),
            AbiValue::Address(r.relayer),
            AbiValue::uint256_from_u128(fee_or_zero(r.fee)),
            AbiValue::Bytes(r.memo_1.clone()),
            AbiValue::Bytes(r.memo_2.clone()),
        ],
    )
}

pub fn encode_transfer_multi(r: &TransferMultiRequest) -> Vec<u8> {
    encode_call(
        SIG_TRANSFER_MULTI,
        &[
            proof_arg(&r.proof),
            fixed_bytes32s(&r.roots),
            fixed_bytes32s(&r.nullifiers),
            bytes32_arg(r.output_commitment_1),
            bytes32_arg(r.output_commitment_2),
            AbiValue::Address(r.relayer),
            AbiValue::uint256_from_u128(fee_or_zero(r.fee)),
            AbiValue::Uint256({
                let mut b = [0u8; 32];
                b[31] = r.num_inputs;
                b
            }),
            AbiValue::Bytes(r.memo_1.clone()),
            AbiValue::Bytes(r.memo_2.clone()),
        ],
    )
}

pub fn encode_swap(r: &SwapRequest) -> Vec<u8> {
    encode_call(
        SIG_SWAP,
        &[
            proof_arg(&r.proof),
            bytes32_arg(r.root),
            bytes32_arg(r.input_nullifier),
            bytes32_arg(r.output_commitment_1),
            bytes32_arg(r.output_commitment_2),
            AbiValue::Address(r.token_in),
            AbiValue::Address(r.token_out),
            AbiValue::uint256_from_u128(r.swap_amount),
            AbiValue::uint256_from_u128(r.output_amount),
            AbiValue::uint256_from_u128(r.min_amount_out),
            AbiValue::Bytes(r.encrypted_memo.clone()),
        ],
    )
}

pub fn encode_batch_transfer(r: &BatchTransferRequest) -> Vec<u8> {
    encode_call(
        SIG_BATCH_TRANSFER,
        &[
            dyn_proofs(&r.proofs),
            dyn_bytes32s(&r.roots),
            dyn_bytes32s(&r.nullifiers),
            bytes32_arg(r.output_commitment_1),
            bytes32_arg(r.output_commitment_2),
            AbiValue::Address(r.token),
            AbiValue::Address(r.relayer),
            AbiValue::uint256_from_u128(fee_or_zero(r.fee)),
            AbiValue::Bytes(r.memo_1.clone()),
            AbiValue::Bytes(r.memo_2.clone()),
        ],
    )
}

pub fn encode_batch_unshield(r: &BatchUnshieldRequest) -> Vec<u8> {
    encode_call(
        SIG_BATCH_UNSHIELD,
        &[
            dyn_proofs(&r.proofs),
            dyn_bytes32s(&r.roots),
            dyn_bytes32s(&r.nullifiers),
            AbiValue::Address(r.recipient),
            AbiValue::Address(r.token),
            dyn_uint256s(&r.amounts),
            dyn_bytes32s(&r.change_commitments),
            AbiValue::Address(r.relayer),
            AbiValue::uint256_from_u128(fee_or_zero(r.total_fee)),
        ],
    )
}

/// splits `total_fee` evenly across `n` proofs, floor division with the
/// remainder assigned to the first (SPEC_FULL.md §4.5 "batch fallback").
pub fn split_fee_for_fallback(total_fee: u128, n: usize) -> Vec<u128> {
    if n == 0 {
        return vec![];
    }
    let share = total_fee / n as u128;
    let remainder = total_fee % n as u128;
    let mut out = vec![share; n];
    out[0] += remainder;
    out
}

/// the individual `unshieldNative`/`unshieldToken` calls issued when
/// `batchUnshield` isn't present on the pool contract.
pub fn encode_batch_unshield_fallback(r: &BatchUnshieldRequest) -> Vec<Vec<u8>> {
    let fees = split_fee_for_fallback(fee_or_zero(r.total_fee), r.proofs.len());
    (0..r.proofs.len())
        .map(|i| {
            let single = UnshieldRequest {
                pool: r.pool,
                proof: r.proofs[i].clone(),
                public_inputs: None,
                root: r.roots[i],
                nullifier_hash: r.nullifiers[i],
                recipient: r.recipient,
                token: r.token,
                amount: r.amounts[i],
                change_commitment: r.change_commitments[i],
                relayer: r.relayer,
                fee: Some(fees[i]),
            };
            encode_unshield(&single)
        })
        .collect()
}

pub fn encode(request: &RelayRequest) -> Vec<u8> {
    match request {
        RelayRequest::Unshield(r) => encode_unshield(r),
        RelayRequest::Transfer(r) => encode_transfer(r),
        RelayRequest::TransferMulti(r) => encode_transfer_multi(r),
        RelayRequest::Swap(r) => encode_swap(r),
        RelayRequest::BatchTransfer(r) => encode_batch_transfer(r),
        RelayRequest::BatchUnshield(r) => encode_batch_unshield(r),
    }
}
