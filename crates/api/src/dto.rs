//! JSON wire shapes for the HTTP surface (spec.md §6). Field elements are
//! `0x`-prefixed big-endian hex, amounts are decimal strings (a `u128`
//! doesn't fit losslessly in a JSON number), addresses use `Address`'s own
//! hex `Serialize`/`Deserialize`.

use std::collections::HashMap;

use chain_client::{Address, TxHash};
use field_hash::Fr;
use pool_state::{CommitmentKind, CommitmentMeta, PoolStats, PublishedMemo};
use relay_executor::proof::Proof;
use relay_executor::request::{
    BatchTransferRequest, BatchUnshieldRequest, RelayRequest, SwapRequest, TransferMultiRequest,
    TransferRequest, UnshieldRequest,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// `0x`-prefixed hex encoding for `Fr`, used wherever a field element
/// crosses the HTTP boundary.
pub mod fr_hex {
    use field_hash::Fr;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Fr, serializer: S) -> Result<S::Ok, S::Error> {
        value.to_hex_be().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Fr, D::Error> {
        let s = String::deserialize(deserializer)?;
        Fr::from_hex_be(&s).map_err(serde::de::Error::custom)
    }
}

pub mod fr_hex_vec {
    use field_hash::Fr;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &[Fr], serializer: S) -> Result<S::Ok, S::Error> {
        let hexes: Vec<String> = values.iter().map(Fr::to_hex_be).collect();
        hexes.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Fr>, D::Error> {
        let strs = Vec::<String>::deserialize(deserializer)?;
        strs.iter()
            .map(|s| Fr::from_hex_be(s).map_err(serde::de::Error::custom))
            .collect()
    }
}

/// decimal-string encoding for `u128` amounts.
pub mod amount_str {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        value.to_string().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

pub mod opt_amount_str {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u128>, serializer: S) -> Result<S::Ok, S::Error> {
        value.map(|v| v.to_string()).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u128>, D::Error> {
        let s = Option::<String>::deserialize(deserializer)?;
        s.map(|s| s.parse().map_err(serde::de::Error::custom)).transpose()
    }
}

pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        format!("0x{}", hex::encode(value)).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
    }
}

fn parse_proof(words: &[String]) -> Result<Proof, ApiError> {
    if words.len() != 8 {
        return Err(ApiError::missing_params(format!(
            "proof must have exactly 8 elements, got {}",
            words.len()
        )));
    }
    let mut elements = [Fr::zero(); 8];
    for (i, w) in words.iter().enumerate() {
        elements[i] = Fr::from_hex_be(w).map_err(|_| ApiError::missing_params(format!("proof[{i}] is not a valid field element")))?;
    }
    Ok(Proof(elements))
}

fn parse_fr(label: &str, s: &str) -> Result<Fr, ApiError> {
    Fr::from_hex_be(s).map_err(|_| ApiError::missing_params(format!("{label} is not a valid field element")))
}

fn parse_memo(label: &str, s: &str) -> Result<Vec<u8>, ApiError> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|_| ApiError::missing_params(format!("{label} is not valid hex")))
}

// --- pool read responses -----------------------------------------------

#[derive(Debug, Serialize)]
pub struct RootResponse {
    #[serde(with = "fr_hex")]
    pub root: Fr,
    pub total_commitments: u64,
}

#[derive(Debug, Serialize)]
pub struct PathResponse {
    #[serde(with = "fr_hex_vec")]
    pub path_elements: Vec<Fr>,
    pub path_indices: Vec<bool>,
    #[serde(with = "fr_hex")]
    pub root: Fr,
}

#[derive(Debug, Serialize)]
pub struct MemoResponse {
    #[serde(with = "fr_hex")]
    pub nullifier_hash: Fr,
    #[serde(with = "fr_hex")]
    pub output_commitment: Fr,
    pub leaf_index: u64,
    #[serde(with = "hex_bytes")]
    pub memo: Vec<u8>,
    pub timestamp: u64,
    pub tx_hash: TxHash,
}

impl From<&PublishedMemo> for MemoResponse {
    fn from(m: &PublishedMemo) -> Self {
        Self {
            nullifier_hash: m.nullifier_hash,
            output_commitment: m.output_commitment,
            leaf_index: m.leaf_index,
            memo: m.memo.clone(),
            timestamp: m.timestamp,
            tx_hash: m.tx_hash,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NullifierStatusResponse {
    pub spent: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CommitmentKindDto {
    Shield,
    Transfer,
    Swap,
    BatchUnshieldChange,
}

impl From<CommitmentKind> for CommitmentKindDto {
    fn from(k: CommitmentKind) -> Self {
        match k {
            CommitmentKind::Shield => CommitmentKindDto::Shield,
            CommitmentKind::Transfer => CommitmentKindDto::Transfer,
            CommitmentKind::Swap => CommitmentKindDto::Swap,
            CommitmentKind::BatchUnshieldChange => CommitmentKindDto::BatchUnshieldChange,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommitmentResponse {
    pub leaf_index: u64,
    pub token: Address,
    #[serde(with = "amount_str")]
    pub amount: u128,
    pub timestamp: u64,
    pub block_number: u64,
    pub tx_hash: TxHash,
    pub kind: CommitmentKindDto,
}

impl From<&CommitmentMeta> for CommitmentResponse {
    fn from(m: &CommitmentMeta) -> Self {
        Self {
            leaf_index: m.leaf_index,
            token: m.token,
            amount: m.amount,
            timestamp: m.timestamp,
            block_number: m.block_number,
            tx_hash: m.tx_hash,
            kind: m.kind.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DiscoverRequest {
    pub pool: Address,
    pub since: Option<u64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DiscoverResponse {
    pub memos: Vec<MemoResponse>,
    pub next_since: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct PoolStatsResponse {
    pub total_commitments: u64,
    pub total_nullifiers: u64,
    pub shielded_balances: HashMap<Address, String>,
    #[serde(with = "fr_hex")]
    pub root: Fr,
}

impl From<PoolStats> for PoolStatsResponse {
    fn from(s: PoolStats) -> Self {
        Self {
            total_commitments: s.total_commitments,
            total_nullifiers: s.total_nullifiers,
            shielded_balances: s.shielded_balances.into_iter().map(|(t, v)| (t, v.to_string())).collect(),
            root: s.root,
        }
    }
}

// --- relay info / simulate ----------------------------------------------

#[derive(Debug, Serialize)]
pub struct RelayInfoResponse {
    pub relayer: Address,
    #[serde(with = "amount_str")]
    pub native_balance: u128,
    pub available: bool,
    pub min_fee_floor: String,
    pub ceiling_bps: u32,
}

#[derive(Debug, Serialize)]
pub struct SimulateResponse {
    pub would_pass: bool,
    pub decoded_error: Option<String>,
    pub estimated_fee: Option<String>,
    pub suggestion: Option<String>,
    pub checks: Vec<CheckResult>,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub tx_hash: TxHash,
    pub leaf_indices: Vec<u64>,
    pub receipt_seen: bool,
    /// true if this tx hash was served from the dedup ring rather than
    /// freshly submitted (spec.md §4.5).
    pub duplicate: bool,
    /// all per-proof tx hashes when the batch-unshield fallback fired;
    /// empty otherwise. `tx_hash` is the first of these.
    pub individual_txs: Vec<TxHash>,
    /// true if `batchUnshield` was missing on the pool contract and the
    /// request was resubmitted as individual `unshield*` calls.
    pub fallback: bool,
}

// --- relay request DTOs --------------------------------------------------
// every field that encodes a field element or hash arrives as `0x`-hex;
// amounts and fees arrive as decimal strings so large `u128`s survive JSON.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnshieldRequestDto {
    pub pool: Address,
    pub proof: Vec<String>,
    #[serde(default)]
    pub public_inputs: Option<Vec<String>>,
    pub root: String,
    pub nullifier_hash: String,
    pub recipient: Address,
    pub token: Address,
    #[serde(with = "amount_str")]
    pub amount: u128,
    #[serde(default)]
    pub change_commitment: Option<String>,
    pub relayer: Address,
    #[serde(default, with = "opt_amount_str")]
    pub fee: Option<u128>,
}

impl UnshieldRequestDto {
    pub fn into_domain(self) -> Result<RelayRequest, ApiError> {
        let change_commitment = match self.change_commitment {
            Some(s) => parse_fr("changeCommitment", &s)?,
            None => Fr::zero(),
        };
        let public_inputs = self
            .public_inputs
            .map(|v| v.iter().map(|s| parse_fr("publicInputs[]", s)).collect::<Result<Vec<_>, _>>())
            .transpose()?;
        Ok(RelayRequest::Unshield(UnshieldRequest {
            pool: self.pool,
            proof: parse_proof(&self.proof)?,
            public_inputs,
            root: parse_fr("root", &self.root)?,
            nullifier_hash: parse_fr("nullifierHash", &self.nullifier_hash)?,
            recipient: self.recipient,
            token: self.token,
            amount: self.amount,
            change_commitment,
            relayer: self.relayer,
            fee: self.fee,
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequestDto {
    pub pool: Address,
    pub proof: Vec<String>,
    #[serde(default)]
    pub public_inputs: Option<Vec<String>>,
    pub root: String,
    pub nullifier_hash: String,
    pub output_commitment_1: String,
    pub output_commitment_2: String,
    pub relayer: Address,
    #[serde(default, with = "opt_amount_str")]
    pub fee: Option<u128>,
    #[serde(default)]
    pub memo_1: String,
    #[serde(default)]
    pub memo_2: String,
}

impl TransferRequestDto {
    pub fn into_domain(self) -> Result<RelayRequest, ApiError> {
        let public_inputs = self
            .public_inputs
            .map(|v| v.iter().map(|s| parse_fr("publicInputs[]", s)).collect::<Result<Vec<_>, _>>())
            .transpose()?;
        Ok(RelayRequest::Transfer(TransferRequest {
            pool: self.pool,
            proof: parse_proof(&self.proof)?,
            public_inputs,
            root: parse_fr("root", &self.root)?,
            nullifier_hash: parse_fr("nullifierHash", &self.nullifier_hash)?,
            output_commitment_1: parse_fr("outputCommitment1", &self.output_commitment_1)?,
            output_commitment_2: parse_fr("outputCommitment2", &self.output_commitment_2)?,
            relayer: self.relayer,
            fee: self.fee,
            memo_1: parse_memo("memo1", &self.memo_1)?,
            memo_2: parse_memo("memo2", &self.memo_2)?,
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferMultiRequestDto {
    pub pool: Address,
    pub proof: Vec<String>,
    #[serde(default)]
    pub public_inputs: Option<Vec<String>>,
    pub roots: Vec<String>,
    pub nullifiers: Vec<String>,
    pub num_inputs: u8,
    pub output_commitment_1: String,
    pub output_commitment_2: String,
    pub relayer: Address,
    #[serde(default, with = "opt_amount_str")]
    pub fee: Option<u128>,
    #[serde(default)]
    pub memo_1: String,
    #[serde(default)]
    pub memo_2: String,
}

impl TransferMultiRequestDto {
    pub fn into_domain(self) -> Result<RelayRequest, ApiError> {
        let roots = self.roots.iter().map(|s| parse_fr("roots[]", s)).collect::<Result<Vec<_>, _>>()?;
        let nullifiers = self.nullifiers.iter().map(|s| parse_fr("nullifiers[]", s)).collect::<Result<Vec<_>, _>>()?;
        let public_inputs = self
            .public_inputs
            .map(|v| v.iter().map(|s| parse_fr("publicInputs[]", s)).collect::<Result<Vec<_>, _>>())
            .transpose()?;
        Ok(RelayRequest::TransferMulti(TransferMultiRequest {
            pool: self.pool,
            proof: parse_proof(&self.proof)?,
            public_inputs,
            roots,
            nullifiers,
            num_inputs: self.num_inputs,
            output_commitment_1: parse_fr("outputCommitment1", &self.output_commitment_1)?,
            output_commitment_2: parse_fr("outputCommitment2", &self.output_commitment_2)?,
            relayer: self.relayer,
            fee: self.fee,
            memo_1: parse_memo("memo1", &self.memo_1)?,
            memo_2: parse_memo("memo2", &self.memo_2)?,
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequestDto {
    pub pool: Address,
    pub proof: Vec<String>,
    #[serde(default)]
    pub public_inputs: Option<Vec<String>>,
    pub root: String,
    pub input_nullifier: String,
    pub output_commitment_1: String,
    pub output_commitment_2: String,
    pub token_in: Address,
    pub token_out: Address,
    #[serde(with = "amount_str")]
    pub swap_amount: u128,
    #[serde(with = "amount_str")]
    pub output_amount: u128,
    #[serde(with = "amount_str")]
    pub min_amount_out: u128,
    #[serde(default)]
    pub encrypted_memo: String,
}

impl SwapRequestDto {
    pub fn into_domain(self) -> Result<RelayRequest, ApiError> {
        let public_inputs = self
            .public_inputs
            .map(|v| v.iter().map(|s| parse_fr("publicInputs[]", s)).collect::<Result<Vec<_>, _>>())
            .transpose()?;
        Ok(RelayRequest::Swap(SwapRequest {
            pool: self.pool,
            proof: parse_proof(&self.proof)?,
            public_inputs,
            root: parse_fr("root", &self.root)?,
            input_nullifier: parse_fr("inputNullifier", &self.input_nullifier)?,
            output_commitment_1: parse_fr("outputCommitment1", &self.output_commitment_1)?,
            output_commitment_2: parse_fr("outputCommitment2", &self.output_commitment_2)?,
            token_in: self.token_in,
            token_out: self.token_out,
            swap_amount: self.swap_amount,
            output_amount: self.output_amount,
            min_amount_out: self.min_amount_out,
            encrypted_memo: parse_memo("encryptedMemo", &self.encrypted_memo)?,
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTransferRequestDto {
    pub pool: Address,
    pub proofs: Vec<Vec<String>>,
    #[serde(default)]
    pub public_inputs: Option<Vec<Vec<String>>>,
    pub roots: Vec<String>,
    pub nullifiers: Vec<String>,
    pub output_commitment_1: String,
    pub output_commitment_2: String,
    pub token: Address,
    pub relayer: Address,
    #[serde(default, with = "opt_amount_str")]
    pub fee: Option<u128>,
    #[serde(default)]
    pub memo_1: String,
    #[serde(default)]
    pub memo_2: String,
}

impl BatchTransferRequestDto {
    pub fn into_domain(self) -> Result<RelayRequest, ApiError> {
        let proofs = self.proofs.iter().map(|p| parse_proof(p)).collect::<Result<Vec<_>, _>>()?;
        let roots = self.roots.iter().map(|s| parse_fr("roots[]", s)).collect::<Result<Vec<_>, _>>()?;
        let nullifiers = self.nullifiers.iter().map(|s| parse_fr("nullifiers[]", s)).collect::<Result<Vec<_>, _>>()?;
        let public_inputs = match self.public_inputs {
            Some(rows) => rows
                .iter()
                .map(|row| row.iter().map(|s| parse_fr("publicInputs[]", s)).collect::<Result<Vec<_>, _>>().map(Some))
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![None; proofs.len()],
        };
        Ok(RelayRequest::BatchTransfer(BatchTransferRequest {
            pool: self.pool,
            proofs,
            public_inputs,
            roots,
            nullifiers,
            output_commitment_1: parse_fr("outputCommitment1", &self.output_commitment_1)?,
            output_commitment_2: parse_fr("outputCommitment2", &self.output_commitment_2)?,
            token: self.token,
            relayer: self.relayer,
            fee: self.fee,
            memo_1: parse_memo("memo1", &self.memo_1)?,
            memo_2: parse_memo("memo2", &self.memo_2)?,
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUnshieldRequestDto {
    pub pool: Address,
    pub proofs: Vec<Vec<String>>,
    #[serde(default)]
    pub public_inputs: Option<Vec<Vec<String>>>,
    pub roots: Vec<String>,
    pub nullifiers: Vec<String>,
    pub recipient: Address,
    pub token: Address,
    #[serde(deserialize_with = "deserialize_amount_vec")]
    pub amounts: Vec<u128>,
    #[serde(default)]
    pub change_commitments: Option<Vec<String>>,
    pub relayer: Address,
    #[serde(default, with = "opt_amount_str")]
    pub total_fee: Option<u128>,
}

fn deserialize_amount_vec<'de, D>(deserializer: D) -> Result<Vec<u128>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let strs = Vec::<String>::deserialize(deserializer)?;
    strs.iter().map(|s| s.parse().map_err(serde::de::Error::custom)).collect()
}

impl BatchUnshieldRequestDto {
    pub fn into_domain(self) -> Result<RelayRequest, ApiError> {
        let proofs = self.proofs.iter().map(|p| parse_proof(p)).collect::<Result<Vec<_>, _>>()?;
        let roots = self.roots.iter().map(|s| parse_fr("roots[]", s)).collect::<Result<Vec<_>, _>>()?;
        let nullifiers = self.nullifiers.iter().map(|s| parse_fr("nullifiers[]", s)).collect::<Result<Vec<_>, _>>()?;
        let public_inputs = match self.public_inputs {
            Some(rows) => rows
                .iter()
                .map(|row| row.iter().map(|s| parse_fr("publicInputs[]", s)).collect::<Result<Vec<_>, _>>().map(Some))
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![None; proofs.len()],
        };
        let change_commitments = match self.change_commitments {
            Some(v) => v.iter().map(|s| parse_fr("changeCommitments[]", s)).collect::<Result<Vec<_>, _>>()?,
            None => vec![Fr::zero(); self.amounts.len()],
        };
        Ok(RelayRequest::BatchUnshield(BatchUnshieldRequest {
            pool: self.pool,
            proofs,
            public_inputs,
            roots,
            nullifiers,
            recipient: self.recipient,
            token: self.token,
            amounts: self.amounts,
            change_commitments,
            relayer: self.relayer,
            total_fee: self.total_fee,
        }))
    }
}

/// `/relay/simulate`'s body: a dry-run request for any of the six relay
/// operations, discriminated by `operation` (spec.md §6 "`/relay/simulate`
/// ... a generic dry-run for the relay operations").
#[derive(Debug, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum SimulateRequestDto {
    Unshield(UnshieldRequestDto),
    Transfer(TransferRequestDto),
    TransferMulti(TransferMultiRequestDto),
    Swap(SwapRequestDto),
    BatchTransfer(BatchTransferRequestDto),
    BatchUnshield(BatchUnshieldRequestDto),
}

impl SimulateRequestDto {
    pub fn into_domain(self) -> Result<RelayRequest, ApiError> {
        match self {
            SimulateRequestDto::Unshield(dto) => dto.into_domain(),
            SimulateRequestDto::Transfer(dto) => dto.into_domain(),
            SimulateRequestDto::TransferMulti(dto) => dto.into_domain(),
            SimulateRequestDto::Swap(dto) => dto.into_domain(),
            SimulateRequestDto::BatchTransfer(dto) => dto.into_domain(),
            SimulateRequestDto::BatchUnshield(dto) => dto.into_domain(),
        }
    }
}
