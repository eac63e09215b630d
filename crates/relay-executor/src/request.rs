//! the six shielded-operation request shapes (SPEC_FULL.md §4.5). Each
//! struct is the parsed, typed form of a client-submitted bundle; the
//! `api` crate's JSON DTOs convert into these, so the policy gates and
//! dispatch never see raw hex strings.

use chain_client::Address;
use field_hash::Fr;

use crate::proof::{Proof, PublicInputs};

#[derive(Clone, Debug)]
pub struct UnshieldRequest {
    pub pool: Address,
    pub proof: Proof,
    pub public_inputs: Option<PublicInputs>,
    pub root: Fr,
    pub nullifier_hash: Fr,
    pub recipient: Address,
    pub token: Address,
    pub amount: u128,
    /// zero-hash means "no change note" (V3 partial unshield).
    pub change_commitment: Fr,
    pub relayer: Address,
    pub fee: Option<u128>,
}

#[derive(Clone, Debug)]
pub struct TransferRequest {
    pub pool: Address,
    pub proof: Proof,
    pub public_inputs: Option<PublicInputs>,
    pub root: Fr,
    pub nullifier_hash: Fr,
    pub output_commitment_1: Fr,
    pub output_commitment_2: Fr,
    pub relayer: Address,
    pub fee: Option<u128>,
    pub memo_1: Vec<u8>,
    pub memo_2: Vec<u8>,
}

/// Zcash-style multi-input transfer: a fixed-size 5-slot nullifier/root
/// vector, only `num_inputs` (2..=5) of which are meaningful.
#[derive(Clone, Debug)]
pub struct TransferMultiRequest {
    pub pool: Address,
    pub proof: Proof,
    pub public_inputs: Option<PublicInputs>,
    pub roots: Vec<Fr>,
    pub nullifiers: Vec<Fr>,
    pub num_inputs: u8,
    pub output_commitment_1: Fr,
    pub output_commitment_2: Fr,
    pub relayer: Address,
    pub fee: Option<u128>,
    pub memo_1: Vec<u8>,
    pub memo_2: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct SwapRequest {
    pub pool: Address,
    pub proof: Proof,
    pub public_inputs: Option<PublicInputs>,
    pub root: Fr,
    pub input_nullifier: Fr,
    pub output_commitment_1: Fr,
    pub output_commitment_2: Fr,
    pub token_in: Address,
    pub token_out: Address,
    pub swap_amount: u128,
    pub output_amount: u128,
    pub min_amount_out: u128,
    pub encrypted_memo: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct BatchTransferRequest {
    pub pool: Address,
    pub proofs: Vec<Proof>,
    pub public_inputs: Vec<Option<PublicInputs>>,
    pub roots: Vec<Fr>,
    pub nullifiers: Vec<Fr>,
    pub output_commitment_1: Fr,
    pub output_commitment_2: Fr,
    pub token: Address,
    pub relayer: Address,
    pub fee: Option<u128>,
    pub memo_1: Vec<u8>,
    pub memo_2: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct BatchUnshieldRequest {
    pub pool: Address,
    pub proofs: Vec<Proof>,
    pub public_inputs: Vec<Option<PublicInputs>>,
    pub roots: Vec<Fr>,
    pub nullifiers: Vec<Fr>,
    pub recipient: Address,
    pub token: Address,
    pub amounts: Vec<u128>,
    pub change_commitments: Vec<Fr>,
    pub relayer: Address,
    pub total_fee: Option<u128>,
}

#[derive(Clone, Debug)]
pub enum RelayRequest {
    Unshield(UnshieldRequest),
    Transfer(TransferRequest),
    TransferMulti(TransferMultiRequest),
    Swap(SwapRequest),
    BatchTransfer(BatchTransferRequest),
    BatchUnshield(BatchUnshieldRequest),
}

impl RelayRequest {
    pub fn pool(&self) -> Address {
        match self {
            RelayRequest::Unshield(r) => r.pool,
            RelayRequest::Transfer(r) => r.pool,
            RelayRequest::TransferMulti(r) => r.pool,
            RelayRequest::Swap(r) => r.pool,
            RelayRequest::BatchTransfer(r) => r.pool,
            RelayRequest::BatchUnshield(r) => r.pool,
        }
    }

    pub fn recipient(&self) -> Option<Address> {
        match self {
            RelayRequest::Unshield(r) => Some(r.recipient),
            RelayRequest::BatchUnshield(r) => Some(r.recipient),
            _ => None,
        }
    }

    pub fn nullifiers(&self) -> Vec<Fr> {
        match self {
            RelayRequest::Unshield(r) => vec![r.nullifier_hash],
            RelayRequest::Transfer(r) => vec![r.nullifier_hash],
            RelayRequest::TransferMulti(r) => r.nullifiers[..r.num_inputs as usize].to_vec(),
            RelayRequest::Swap(r) => vec![r.input_nullifier],
            RelayRequest::BatchTransfer(r) => r.nullifiers.clone(),
            RelayRequest::BatchUnshield(r) => r.nullifiers.clone(),
        }
    }

    pub fn roots(&self) -> Vec<Fr> {
        match self {
            RelayRequest::Unshield(r) => vec![r.root],
            RelayRequest::Transfer(r) => vec![r.root],
            RelayRequest::TransferMulti(r) => r.roots[..r.num_inputs as usize].to_vec(),
            RelayRequest::Swap(r) => vec![r.root],
            RelayRequest::BatchTransfer(r) => r.roots.clone(),
            RelayRequest::BatchUnshield(r) => r.roots.clone(),
        }
    }

    pub fn amounts(&self) -> Vec<u128> {
        match self {
            RelayRequest::Unshield(r) => vec![r.amount],
            RelayRequest::Transfer(_) | RelayRequest::TransferMulti(_) => vec![],
            RelayRequest::Swap(r) => vec![r.swap_amount, r.output_amount],
            RelayRequest::BatchTransfer(_) => vec![],
            RelayRequest::BatchUnshield(r) => r.amounts.clone(),
        }
    }

    pub fn fee(&self) -> Option<u128> {
        match self {
            RelayRequest::Unshield(r) => r.fee,
            RelayRequest::Transfer(r) => r.fee,
            RelayRequest::TransferMulti(r) => r.fee,
            RelayRequest::Swap(_) => None,
            RelayRequest::BatchTransfer(r) => r.fee,
            RelayRequest::BatchUnshield(r) => r.total_fee,
        }
    }

    /// fee is charged against this token's decimals (native unless a token
    /// field is present).
    pub fn fee_token(&self) -> Address {
        match self {
            RelayRequest::Unshield(r) => r.token,
            RelayRequest::BatchTransfer(r) => r.token,
            RelayRequest::BatchUnshield(r) => r.token,
            _ => Address::NATIVE,
        }
    }

    pub fn non_native_tokens(&self) -> Vec<Address> {
        match self {
            RelayRequest::Unshield(r) if !r.token.is_native() => vec![r.token],
            RelayRequest::Swap(r) => [r.token_in, r.token_out].into_iter().filter(|t| !t.is_native()).collect(),
            RelayRequest::BatchTransfer(r) if !r.token.is_native() => vec![r.token],
            RelayRequest::BatchUnshield(r) if !r.token.is_native() => vec![r.token],
            _ => vec![],
        }
    }

    pub fn memos(&self) -> Vec<&[u8]> {
        match self {
            RelayRequest::Unshield(_) => vec![],
            RelayRequest::Transfer(r) => vec![&r.memo_1, &r.memo_2],
            RelayRequest::TransferMulti(r) => vec![&r.memo_1, &r.memo_2],
            RelayRequest::Swap(r) => vec![&r.encrypted_memo],
            RelayRequest::BatchTransfer(r) => vec![&r.memo_1, &r.memo_2],
            RelayRequest::BatchUnshield(_) => vec![],
        }
    }

    pub fn proof_count(&self) -> usize {
        match self {
            RelayRequest::BatchTransfer(r) => r.proofs.len(),
            RelayRequest::BatchUnshield(r) => r.proofs.len(),
            _ => 1,
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, RelayRequest::BatchTransfer(_) | RelayRequest::BatchUnshield(_))
    }

    /// one public-inputs vector per proof, aligned positionally.
    pub fn public_inputs(&self) -> Vec<Option<&PublicInputs>> {
        match self {
            RelayRequest::Unshield(r) => vec![r.public_inputs.as_ref()],
            RelayRequest::Transfer(r) => vec![r.public_inputs.as_ref()],
            RelayRequest::TransferMulti(r) => vec![r.public_inputs.as_ref()],
            RelayRequest::Swap(r) => vec![r.public_inputs.as_ref()],
            RelayRequest::BatchTransfer(r) => r.public_inputs.iter().map(|p| p.as_ref()).collect(),
            RelayRequest::BatchUnshield(r) => r.public_inputs.iter().map(|p| p.as_ref()).collect(),
        }
    }
}

/// the canonical tuple a repeat request is matched against (SPEC_FULL.md
/// §4.5 "a canonicalized tuple of (pool, recipient, sorted nullifiers,
/// sorted amounts, totalFee)").
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pool: Address,
    recipient: Option<Address>,
    nullifiers: Vec<[u8; 32]>,
    amounts: Vec<u128>,
    fee: Option<u128>,
}

impl RelayRequest {
    pub fn dedup_key(&self) -> DedupKey {
        let mut nullifiers: Vec<[u8; 32]> = self.nullifiers().iter().map(Fr::to_bytes_be).collect();
        nullifiers.sort();
        let mut amounts = self.amounts();
        amounts.sort();
        DedupKey {
            pool: self.pool(),
            recipient: self.recipient(),
            nullifiers,
            amounts,
            fee: self.fee(),
        }
    }
}
